#![allow(dead_code)]

use std::cell::RefCell;

use caretta_field::api::Backend;
use caretta_field::error::{Error, Result};
use caretta_field::models::{Credentials, Nest, NestEvent, Turtle, TurtleEvent, TurtleId, User};

/// In-memory backend that records every write and can be told to fail
/// specific calls.
#[derive(Default)]
pub struct Recording {
    pub nests: RefCell<Vec<Nest>>,
    pub turtles: RefCell<Vec<Turtle>>,
    pub nest_events: RefCell<Vec<NestEvent>>,
    pub turtle_events: RefCell<Vec<TurtleEvent>>,
    pub calls: RefCell<Vec<String>>,
    pub fail: RefCell<Vec<&'static str>>,
    next_id: RefCell<i64>,
}

impl Recording {
    pub fn with_nests(nests: Vec<Nest>) -> Self {
        let r = Self::default();
        *r.nests.borrow_mut() = nests;
        r
    }

    pub fn with_turtles(turtles: Vec<Turtle>) -> Self {
        let r = Self::default();
        *r.turtles.borrow_mut() = turtles;
        r
    }

    pub fn failing(self, call: &'static str) -> Self {
        self.fail.borrow_mut().push(call);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn enter(&self, call: &'static str) -> Result<()> {
        self.calls.borrow_mut().push(call.to_string());
        if self.fail.borrow().contains(&call) {
            return Err(Error::api(500, format!("{call} exploded")));
        }
        Ok(())
    }

    fn id(&self) -> i64 {
        let mut n = self.next_id.borrow_mut();
        *n += 1;
        100 + *n
    }
}

impl Backend for Recording {
    fn register(&self, creds: &Credentials) -> Result<User> {
        self.enter("register")?;
        Ok(User {
            id: Some(self.id()),
            name: creds.name.clone().unwrap_or_default(),
            email: creds.email.clone(),
            role: None,
        })
    }

    fn login(&self, creds: &Credentials) -> Result<User> {
        self.enter("login")?;
        Ok(User {
            id: Some(1),
            name: String::new(),
            email: creds.email.clone(),
            role: Some("volunteer".into()),
        })
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.enter("list_users")?;
        Ok(Vec::new())
    }

    fn create_turtle(&self, turtle: &Turtle) -> Result<Turtle> {
        self.enter("create_turtle")?;
        let mut t = turtle.clone();
        t.id = Some(self.id());
        self.turtles.borrow_mut().push(t.clone());
        Ok(t)
    }

    fn update_turtle(&self, id: TurtleId, turtle: &Turtle) -> Result<Turtle> {
        self.enter("update_turtle")?;
        let mut all = self.turtles.borrow_mut();
        let slot = all
            .iter_mut()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| Error::api(404, "Turtle not found"))?;
        *slot = turtle.clone();
        Ok(turtle.clone())
    }

    fn list_turtles(&self) -> Result<Vec<Turtle>> {
        self.enter("list_turtles")?;
        Ok(self.turtles.borrow().clone())
    }

    fn get_turtle(&self, id: TurtleId) -> Result<Turtle> {
        self.enter("get_turtle")?;
        self.turtles
            .borrow()
            .iter()
            .find(|t| t.id == Some(id))
            .cloned()
            .ok_or_else(|| Error::api(404, "Turtle not found"))
    }

    fn turtle_survey_events(&self, id: TurtleId) -> Result<Vec<TurtleEvent>> {
        self.enter("turtle_survey_events")?;
        Ok(self
            .turtle_events
            .borrow()
            .iter()
            .filter(|e| e.turtle_id == id)
            .cloned()
            .collect())
    }

    fn create_turtle_event(&self, event: &TurtleEvent) -> Result<TurtleEvent> {
        self.enter("create_turtle_event")?;
        let mut e = event.clone();
        e.id = Some(self.id());
        self.turtle_events.borrow_mut().push(e.clone());
        Ok(e)
    }

    fn create_nest(&self, nest: &Nest) -> Result<Nest> {
        self.enter("create_nest")?;
        let mut n = nest.clone();
        n.id = Some(self.id());
        self.nests.borrow_mut().push(n.clone());
        Ok(n)
    }

    fn update_nest(&self, nest: &Nest) -> Result<Nest> {
        self.enter("update_nest")?;
        let mut all = self.nests.borrow_mut();
        let slot = all
            .iter_mut()
            .find(|n| n.code == nest.code)
            .ok_or_else(|| Error::api(404, "Nest not found"))?;
        *slot = nest.clone();
        Ok(nest.clone())
    }

    fn list_nests(&self) -> Result<Vec<Nest>> {
        self.enter("list_nests")?;
        Ok(self.nests.borrow().clone())
    }

    fn get_nest(&self, code: &str) -> Result<Nest> {
        self.enter("get_nest")?;
        self.nests
            .borrow()
            .iter()
            .find(|n| n.code == code)
            .cloned()
            .ok_or_else(|| Error::api(404, "Nest not found"))
    }

    fn create_nest_event(&self, event: &NestEvent) -> Result<NestEvent> {
        self.enter("create_nest_event")?;
        let mut e = event.clone();
        e.id = Some(self.id());
        self.nest_events.borrow_mut().push(e.clone());
        Ok(e)
    }

    fn nest_events(&self, code: &str) -> Result<Vec<NestEvent>> {
        self.enter("nest_events")?;
        Ok(self
            .nest_events
            .borrow()
            .iter()
            .filter(|e| e.nest_code == code)
            .cloned()
            .collect())
    }
}
