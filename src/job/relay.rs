use crate::rpc::{UrlList, UrlListStream};
use futures::StreamExt;
use tokio::sync::mpsc;

/// Copies analyzed-URL batches from the server straight into `tx`
///
/// Stops quietly when the stream ends or fails, or when the receiver is gone.
pub(crate) async fn forward_batches(
    subcode: String,
    mut stream: UrlListStream,
    tx: mpsc::Sender<UrlList>,
) {
    let mut batches = 0usize;

    while let Some(result) = stream.next().await {
        match result {
            Ok(batch) => {
                if tx.send(batch).await.is_err() {
                    tracing::debug!("Analyzed URL receiver for {} dropped", subcode);
                    break;
                }
                batches += 1;
            }
            Err(e) => {
                tracing::debug!("Analyzed URL stream for {} failed: {}", subcode, e);
                break;
            }
        }
    }

    tracing::debug!("Relayed {} analyzed URL batches for {}", batches, subcode);
}
