//! Shared test doubles: an in-memory transport that records what the client
//! put on the wire.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::{ConnectionManager, Transport, TransportError};
use crate::models::messages::ClientEvent;

#[derive(Default)]
struct FakeState {
    open: bool,
    fail_next_send: bool,
    sent: Vec<String>,
}

/// Test-side view of the fake transport: inspect sent payloads, inject
/// failures.
#[derive(Clone)]
pub struct FakeHandle(Rc<RefCell<FakeState>>);

impl FakeHandle {
    pub fn sent(&self) -> Vec<String> {
        self.0.borrow().sent.clone()
    }

    pub fn fail_next_send(&self) {
        self.0.borrow_mut().fail_next_send = true;
    }

    pub fn is_open(&self) -> bool {
        self.0.borrow().open
    }
}

pub struct FakeTransport(Rc<RefCell<FakeState>>);

impl Transport for FakeTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.0.borrow_mut().open = true;
        Ok(())
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        let mut state = self.0.borrow_mut();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if state.fail_next_send {
            state.fail_next_send = false;
            return Err(TransportError::Failed("injected failure".to_string()));
        }
        state.sent.push(payload.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.0.borrow_mut().open = false;
    }

    fn is_open(&self) -> bool {
        self.0.borrow().open
    }
}

pub fn fake_transport() -> (FakeTransport, FakeHandle) {
    let state = Rc::new(RefCell::new(FakeState::default()));
    (FakeTransport(state.clone()), FakeHandle(state))
}

/// A ConnectionManager already connected over a fake transport.
pub fn connected_manager() -> (ConnectionManager, FakeHandle) {
    let (transport, handle) = fake_transport();
    let mut manager = ConnectionManager::new(Box::new(transport));
    manager.connect().expect("fake transport always opens");
    while manager.pop_notice().is_some() {}
    (manager, handle)
}

/// Everything the client put on the wire, parsed back into events.
pub fn sent_events(handle: &FakeHandle) -> Vec<ClientEvent> {
    handle
        .sent()
        .iter()
        .map(|raw| serde_json::from_str(raw).expect("sent payloads are valid events"))
        .collect()
}
