//! Transaction bracketing for multi-statement writes.

use std::future::Future;

use tracing::{debug, error, warn};

use crate::core::connection::Connection;
use crate::error::{MapperError, Result};

/// Run `work` between BEGIN and COMMIT.
///
/// `work` is a lazy future: it does not start until BEGIN has succeeded. If
/// it fails, or COMMIT fails, the transaction is rolled back before the error
/// is returned wrapped in [`MapperError::Transaction`]. A BEGIN failure
/// (including an already-open transaction) is returned as is.
pub async fn run<T, F>(conn: &dyn Connection, operation: &str, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    conn.begin().await?;
    debug!("BEGIN {}", operation);

    let result = match work.await {
        Ok(value) => conn.commit().await.map(|()| value),
        Err(e) => Err(e),
    };

    match result {
        Ok(value) => {
            debug!("COMMIT {}", operation);
            Ok(value)
        }
        Err(e) => {
            warn!("Rolling back {}: {}", operation, e);
            if let Err(rollback_err) = conn.rollback().await {
                error!("ROLLBACK of {} failed: {}", operation, rollback_err);
            }
            Err(MapperError::transaction(operation, e))
        }
    }
}
