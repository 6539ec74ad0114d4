use tracing::{debug, warn};

use super::{Completion, Transition, WithConnection};
use crate::{connection::Connection, error::Error, event::StateKind};

/// The end of a run.
#[derive(Debug)]
pub(crate) struct Completed<T> {
    completion: Completion<T>,
}

impl<T: Connection> Completed<T> {
    pub fn new(completion: Completion<T>) -> Self {
        Completed { completion }
    }

    /// Dispose of the connection, if any,
    /// then go back to idle or surface the error.
    pub async fn run(self) -> Result<Transition<T>, Error> {
        match self.completion {
            Completion::WithoutError(link) => {
                close(link).await;
                Ok(Transition::Idle)
            }
            Completion::WithError(error, link) => {
                close(link).await;
                debug!("[{}] Completed with error: {}", StateKind::Completed, error);
                Err(error)
            }
        }
    }
}

async fn close<T: Connection>(link: Option<WithConnection<T>>) {
    if let Some(WithConnection { connection, epoch }) = link {
        match connection.close().await {
            Ok(()) => debug!("[{}] Connection #{} closed", StateKind::Completed, epoch),
            Err(e) => warn!(
                "[{}] Failed to close connection #{}: {}",
                StateKind::Completed,
                epoch,
                e
            ),
        }
    }
}
