//! Seam to the externally generated dispatch table.

use async_trait::async_trait;

use crate::bridge::endpoint::Endpoint;
use crate::bridge::protocol::ProcedureId;

/// The payload endpoints a dispatched procedure marshals through.
///
/// Worker side: `arg` replies to the driver's argument requests, `res` requests
/// the driver to take results. The core never reads or writes these itself.
#[derive(Debug)]
pub struct PayloadChannels<'a> {
    pub arg: &'a mut Endpoint,
    pub res: &'a mut Endpoint,
}

/// Maps a procedure identifier to the procedure and runs it.
///
/// The returned status is kept by the dispatch loop as bookkeeping; it is not
/// sent to the driver.
#[async_trait]
pub trait DispatchTable: Send {
    async fn dispatch(&mut self, id: ProcedureId, channels: PayloadChannels<'_>) -> i64;
}

/// Plain functions and closures work as dispatch tables that ignore the payload channels.
#[async_trait]
impl<F> DispatchTable for F
where
    F: FnMut(ProcedureId) -> i64 + Send,
{
    async fn dispatch(&mut self, id: ProcedureId, _channels: PayloadChannels<'_>) -> i64 {
        self(id)
    }
}
