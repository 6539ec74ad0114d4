use snafu::ResultExt;
use tracing::{debug, warn};

use super::{Completion, RunContext, Transition};
use crate::{
    connection::{ConnectOptions, ConnectionEvents, Connector},
    error::ConnectSnafu,
    event::StateKind,
};

/// Establishing the transport connection.
#[derive(Debug)]
pub(crate) struct Connecting {
    epoch: u64,
}

#[derive(Clone, Copy)]
enum Interruption {
    Abort,
    Cancel,
}

impl Connecting {
    pub fn new(epoch: u64) -> Self {
        Connecting { epoch }
    }

    pub async fn run<C: Connector>(self, ctx: &RunContext<'_, C>) -> Transition<C::Connection> {
        if ctx.abort_requested() {
            debug!("[{}] Abort requested, not connecting", StateKind::Connecting);
            return Transition::Completed(Completion::WithoutError(None));
        }
        if ctx.cancellation.is_cancelled() {
            warn!("[{}] Cancellation requested, not connecting", StateKind::Connecting);
            return Transition::Idle;
        }

        let options = ctx.options;
        let connect_options = ConnectOptions {
            host: options.host_name().to_string(),
            port: options.port_number(),
            use_tls: options.is_tls(),
            tcp_no_delay: options.is_tcp_no_delay(),
            timeout: options.request_timeout(),
        };
        debug!(
            "[{}] Connecting to {}:{}",
            StateKind::Connecting,
            connect_options.host,
            connect_options.port
        );
        let events = ConnectionEvents::new(ctx.dispatch, self.epoch);
        let mut connect = ctx.connector.connect(&connect_options, events);

        let interruption = tokio::select! {
            biased;
            _ = ctx.abort.cancelled() => Interruption::Abort,
            _ = ctx.cancellation.cancelled() => Interruption::Cancel,
            result = &mut connect => {
                return match result.context(ConnectSnafu {
                    host: connect_options.host.clone(),
                    port: connect_options.port,
                }) {
                    Ok(connection) => {
                        Transition::RequestingAssociation(ctx.open(connection, self.epoch))
                    }
                    Err(e) => Transition::Completed(Completion::WithError(e, None)),
                };
            }
        };

        // let the connection attempt settle so that no socket is left behind,
        // within the abort timeout if the abort is forced
        let settled = match interruption {
            Interruption::Cancel => Some(connect.await),
            Interruption::Abort => {
                let timeout = ctx.options.abort_ack_timeout();
                let timer = ctx.timers.sleep(timeout);
                tokio::select! {
                    result = &mut connect => Some(result),
                    _ = timer => {
                        warn!(
                            "[{}] Connection attempt still pending after {:?}, dropping it",
                            StateKind::Connecting,
                            timeout
                        );
                        None
                    }
                }
            }
        };
        let connection = match settled {
            Some(Ok(connection)) => Some(ctx.open(connection, self.epoch)),
            Some(Err(e)) => {
                debug!("[{}] Interrupted connection attempt failed: {}", StateKind::Connecting, e);
                None
            }
            None => None,
        };

        match (interruption, connection) {
            (Interruption::Cancel, Some(link)) if ctx.cancellation.aborts() => {
                warn!("[{}] Cancellation requested while connecting, aborting", StateKind::Connecting);
                Transition::Abort(link)
            }
            (Interruption::Abort, Some(link)) => {
                debug!("[{}] Abort requested while connecting", StateKind::Connecting);
                Transition::Abort(link)
            }
            (Interruption::Abort, None) => Transition::Completed(Completion::WithoutError(None)),
            (Interruption::Cancel, connection) => {
                warn!("[{}] Cancellation requested while connecting", StateKind::Connecting);
                Transition::Completed(Completion::WithoutError(connection))
            }
        }
    }
}
