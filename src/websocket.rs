use std::cell::RefCell;
use std::rc::Rc;

use actix::io::{SinkWrite, WriteHandler};
use actix::prelude::*;
use actix_codec::Framed;
use awc::error::WsProtocolError;
use awc::ws;
use awc::BoxedSocket;
use futures::channel::oneshot;
use futures::stream::{SplitSink, StreamExt};
use log::{debug, info, warn};

use crate::client::ChessClient;
use crate::connection::{Transport, TransportError};

type WsSink = SplitSink<Framed<BoxedSocket, ws::Codec>, ws::Message>;

/// Slot the dial loop fills with the live connection actor. The Connection
/// Manager sends through it and it empties when the socket drops.
pub type TransportSlot = Rc<RefCell<Option<Addr<ClientWebSocket>>>>;

pub fn transport_slot() -> TransportSlot {
    Rc::new(RefCell::new(None))
}

/// One raw outbound frame.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RawOutbound(pub String);

/// WebSocket actor for the session connection: writes outbound frames,
/// feeds inbound text frames to the client core, answers pings, and signals
/// the dial loop when the socket closes.
pub struct ClientWebSocket {
    core: Rc<RefCell<ChessClient>>,
    sink: SinkWrite<ws::Message, WsSink>,
    closed: Option<oneshot::Sender<()>>,
}

impl ClientWebSocket {
    /// Split the framed socket and start the actor. The returned receiver
    /// fires once when the connection is gone.
    pub fn start(
        core: Rc<RefCell<ChessClient>>,
        framed: Framed<BoxedSocket, ws::Codec>,
    ) -> (Addr<ClientWebSocket>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let (sink, stream) = framed.split();
        let addr = ClientWebSocket::create(|ctx| {
            ClientWebSocket::add_stream(stream, ctx);
            ClientWebSocket {
                core,
                sink: SinkWrite::new(sink, ctx),
                closed: Some(tx),
            }
        });
        (addr, rx)
    }
}

impl Actor for ClientWebSocket {
    type Context = Context<Self>;

    fn started(&mut self, _: &mut Self::Context) {
        info!("WebSocket session started");
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        info!("WebSocket session closed");
        if let Some(tx) = self.closed.take() {
            let _ = tx.send(());
        }
    }
}

impl Handler<RawOutbound> for ClientWebSocket {
    type Result = ();

    fn handle(&mut self, msg: RawOutbound, ctx: &mut Self::Context) {
        debug!("forwarding frame to server: {}", msg.0);
        if self.sink.write(ws::Message::Text(msg.0.into())).is_err() {
            warn!("failed to queue frame, closing connection");
            ctx.stop();
        }
    }
}

impl StreamHandler<Result<ws::Frame, WsProtocolError>> for ClientWebSocket {
    fn handle(&mut self, frame: Result<ws::Frame, WsProtocolError>, ctx: &mut Self::Context) {
        match frame {
            Ok(ws::Frame::Text(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.core.borrow_mut().handle_incoming(text),
                Err(e) => warn!("dropping non-utf8 frame: {}", e),
            },
            Ok(ws::Frame::Ping(payload)) => {
                let _ = self.sink.write(ws::Message::Pong(payload));
            }
            Ok(ws::Frame::Pong(_)) => {}
            Ok(ws::Frame::Binary(_)) => {
                warn!("binary frames are not part of the protocol");
            }
            Ok(ws::Frame::Close(reason)) => {
                info!("server closed the connection: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Frame::Continuation(_)) => {}
            Err(e) => {
                warn!("protocol error: {}", e);
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl WriteHandler<WsProtocolError> for ClientWebSocket {}

/// `Transport` backed by whichever connection actor currently occupies the
/// slot.
pub struct WsTransport {
    slot: TransportSlot,
}

impl WsTransport {
    pub fn new(slot: TransportSlot) -> Self {
        WsTransport { slot }
    }
}

impl Transport for WsTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        match self.slot.borrow().as_ref() {
            Some(addr) if addr.connected() => {
                addr.do_send(RawOutbound(payload.to_string()));
                Ok(())
            }
            _ => Err(TransportError::NotOpen),
        }
    }

    fn close(&mut self) {
        self.slot.borrow_mut().take();
    }

    fn is_open(&self) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .map_or(false, |addr| addr.connected())
    }
}
