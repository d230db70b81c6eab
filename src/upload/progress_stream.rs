use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use super::transport::ProgressSink;

pin_project! {
    /// Body stream reporting the cumulative number of bytes handed to the transport.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        sink: ProgressSink,
        bytes_sent: u64,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, sink: ProgressSink) -> Self {
        Self {
            inner,
            sink,
            bytes_sent: 0,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.bytes_sent += chunk.len() as u64;
                    this.sink.report(*this.bytes_sent);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::sync::mpsc;
    use crate::upload::types::{TaskId, TransportEvent};

    #[tokio::test]
    async fn test_reports_cumulative_bytes() {
        let (events, mut events_rx) = mpsc::unbounded_channel();
        let sink = ProgressSink::new(TaskId::from_raw(4), 10, events);
        let chunks = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"abcd")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"efghij")),
        ]);

        let collected: Vec<_> = ProgressStream::new(chunks, sink).collect().await;
        assert_eq!(collected.len(), 3);

        let mut loaded = Vec::new();
        while let Ok(TransportEvent::Progress { loaded: value, total, .. }) = events_rx.try_recv() {
            assert_eq!(total, 10);
            loaded.push(value);
        }
        assert_eq!(loaded, vec![4, 10]);
    }
}
