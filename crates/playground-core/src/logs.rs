use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use futures_util::StreamExt;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::{trace, warn};

use crate::context::Context;

pub(crate) async fn open_log(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

/// Stream the logs of container `id` into `path` until it stops or the
/// runner shuts down. Failures are logged and dropped.
pub(crate) fn follow_container(ctx: &Arc<Context>, service: &str, id: &str, path: PathBuf) {
    let mut stream = ctx.engine.container_logs(id);
    let shutdown = ctx.shutdown.clone();
    let service = service.to_string();

    ctx.tracker.spawn(async move {
        let mut file = match open_log(&path).await {
            Ok(f) => f,
            Err(e) => {
                warn!(target: "playground.core.logs", %service, path = %path.display(), error = %e, "cannot open log file");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        if let Err(e) = file.write_all(&bytes).await {
                            warn!(target: "playground.core.logs", %service, error = %e, "log write failed");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(target: "playground.core.logs", %service, error = %e, "log stream failed");
                        break;
                    }
                    None => break,
                },
            }
        }
        let _ = file.flush().await;
        trace!(target: "playground.core.logs", %service, "log follower finished");
    });
}

/// Copy a child stdio pipe into a log file until EOF.
///
/// After shutdown the copy lingers a little past the host grace so the
/// last lines of a terminating child still land in the file.
pub(crate) fn pipe<R>(ctx: &Context, service: &str, mut reader: R, mut file: File)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let service = service.to_string();
    let shutdown = ctx.shutdown.clone();
    let linger = ctx.cfg.host_grace + Duration::from_secs(1);
    ctx.tracker.spawn(async move {
        tokio::select! {
            res = tokio::io::copy(&mut reader, &mut file) => {
                if let Err(e) = res {
                    warn!(target: "playground.core.logs", %service, error = %e, "log pipe failed");
                }
            }
            _ = async {
                shutdown.cancelled().await;
                tokio::time::sleep(linger).await;
            } => {}
        }
        let _ = file.flush().await;
    });
}
