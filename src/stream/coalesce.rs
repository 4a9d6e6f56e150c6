//! Render coalescing for snapshot streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// Extension trait to coalesce bursts of items
pub trait CoalesceExt: Stream {
    /// Collapse every burst arriving within `window` into its latest item.
    ///
    /// The first item after a quiet period opens the window. Because feed
    /// snapshots are cumulative, the latest one already contains every line
    /// of the burst, so renders can be batched without losing entries.
    fn coalesce(self, window: Duration) -> Coalesce<Self>
    where
        Self: Sized,
    {
        Coalesce::new(self, window)
    }
}

impl<T: Stream> CoalesceExt for T {}

pin_project! {
    /// A stream combinator that emits the latest item of each burst
    pub struct Coalesce<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        deadline: Sleep,
        window: Duration,
        pending: Option<S::Item>,
        armed: bool,
        exhausted: bool,
    }
}

impl<S: Stream> Coalesce<S> {
    pub fn new(stream: S, window: Duration) -> Self {
        Self {
            stream,
            deadline: sleep(window),
            window,
            pending: None,
            armed: false,
            exhausted: false,
        }
    }
}

impl<S: Stream> Stream for Coalesce<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything ready, keeping only the latest
        while !*this.exhausted {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    if !*this.armed {
                        this.deadline.as_mut().reset(Instant::now() + *this.window);
                        *this.armed = true;
                    }
                    *this.pending = Some(item);
                }
                Poll::Ready(None) => *this.exhausted = true,
                Poll::Pending => break,
            }
        }

        if *this.exhausted {
            // Flush the last burst, then end
            *this.armed = false;
            return Poll::Ready(this.pending.take());
        }

        if !*this.armed {
            return Poll::Pending;
        }

        ready!(this.deadline.as_mut().poll(cx));
        *this.armed = false;
        Poll::Ready(this.pending.take())
    }
}
