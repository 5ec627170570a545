use crate::server::config::HandlerKind;
use std::sync::Arc;
use zjob::{Handler, Message};

/// Builds the handler shared by every worker in the pool.
pub fn build_handler(kind: HandlerKind) -> Arc<dyn Handler> {
    match kind {
        HandlerKind::Echo => Arc::new(echo),
        HandlerKind::Reverse => Arc::new(reverse),
        HandlerKind::Uppercase => Arc::new(uppercase),
    }
}

fn echo(request: Message) -> Message {
    request
}

fn reverse(request: Message) -> Message {
    let mut bytes = request.to_vec();
    bytes.reverse();
    Message::from(bytes)
}

fn uppercase(request: Message) -> Message {
    Message::from(request.to_ascii_uppercase())
}
