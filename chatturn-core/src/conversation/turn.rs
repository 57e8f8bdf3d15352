//! Streamed reply for a single turn

use futures::{Stream, StreamExt, ready};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::Instant;

use crate::error::Result;
use crate::llm::{FragmentStream, Message};

use super::history::HistoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Streaming,
    Committed,
    Failed,
}

/// Fragments of one assistant reply, yielded as they arrive.
///
/// The turn is committed to history only when the underlying stream ends
/// normally: the user message and the concatenated reply are appended and
/// the idle clock is refreshed. A stream error ends the turn without
/// committing anything, as does dropping the stream before it is drained.
///
/// The stream holds the processor's history mutably, so a second turn
/// cannot start until this one is finished or dropped.
#[must_use = "a turn is only recorded once its stream is drained"]
pub struct TurnStream<'a> {
    history: &'a mut HistoryStore,
    inner: FragmentStream,
    user_text: String,
    reply: String,
    state: TurnState,
}

impl<'a> TurnStream<'a> {
    pub(crate) fn new(
        history: &'a mut HistoryStore,
        inner: FragmentStream,
        user_text: String,
    ) -> Self {
        Self {
            history,
            inner,
            user_text,
            reply: String::new(),
            state: TurnState::Streaming,
        }
    }

    /// Reply text received so far
    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Whether the turn has been written to history
    pub fn is_committed(&self) -> bool {
        self.state == TurnState::Committed
    }

    /// Drain the remaining fragments and return the full reply.
    ///
    /// # Errors
    ///
    /// Returns the first stream error; nothing is committed in that case.
    pub async fn collect_reply(mut self) -> Result<String> {
        while let Some(fragment) = self.next().await {
            fragment?;
        }
        Ok(std::mem::take(&mut self.reply))
    }

    fn commit(&mut self) {
        self.history.append(Message::user(self.user_text.clone()));
        self.history.append(Message::assistant(self.reply.clone()));
        self.history.touch(Instant::now());
        self.state = TurnState::Committed;

        tracing::info!(
            reply_len = self.reply.len(),
            history_len = self.history.len(),
            "Turn committed"
        );
    }
}

impl Stream for TurnStream<'_> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != TurnState::Streaming {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => {
                    this.reply.push_str(&fragment);
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, received = this.reply.len(), "Reply stream failed, turn discarded");
                    this.state = TurnState::Failed;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.commit();
                    return Poll::Ready(None);
                }
            }
        }
    }
}
