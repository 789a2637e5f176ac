use std::{future::Future, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::services::key::SigningKeyStore;

/// Rotates the signing key every `period` until `shutdown` resolves. A
/// failed rotation is logged and retried on the next tick, the current
/// key stays in place meanwhile.
pub fn spawn_rotation<F>(
    keys: Arc<SigningKeyStore>,
    period: Duration,
    shutdown: F,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // the store rotated once when it was built
        interval.tick().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    info!("start rotate...");
                    let keys = Arc::clone(&keys);
                    match tokio::task::spawn_blocking(move || keys.rotate())
                        .await
                    {
                        Ok(Ok(kid)) => info!("end rotate, current key {}", kid),
                        Ok(Err(err)) => error!("{}", err),
                        Err(err) => error!("rotation task failed: {}", err),
                    }
                },
                _ = &mut shutdown => {
                    break;
                }
            }
        }
        info!("finish rotate...");
    })
}
