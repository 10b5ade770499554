use std::{collections::HashMap, num::NonZeroUsize, task::Waker};

/// Identifies one waiting `DeferredValue` inside a [`Waiters`] set. Tokens
/// aren't `Clone`; each one belongs to exactly one future.
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) struct Token(NonZeroUsize);

impl Token {
    fn duplicate(&self) -> Token {
        Token(self.0)
    }
}

/// The tasks waiting on a batch that is currently resolving.
///
/// Only one task at a time needs to poll the joined loader future: the
/// "driver". Every other waiter sleeps until the batch completes, at which
/// point they're all woken at once. If the driver goes away before the batch
/// completes, another waiter is promoted and woken so that the batch always
/// has a path forward.
#[derive(Debug)]
pub(crate) struct Waiters {
    wakers: HashMap<Token, Waker>,
    driver: Option<Token>,

    // Waiter sets only live as long as one batch resolution; we don't worry
    // about running out of tokens.
    next_token: NonZeroUsize,
}

impl Default for Waiters {
    fn default() -> Self {
        Self {
            wakers: HashMap::new(),
            driver: None,
            next_token: NonZeroUsize::new(1).expect("1 is nonzero"),
        }
    }
}

impl Waiters {
    /// Record that the task owning `slot` is waiting for completion. If the
    /// slot already holds a token, its waker is refreshed; otherwise a new
    /// token is issued into the slot.
    pub(crate) fn wait(&mut self, slot: &mut Option<Token>, waker: &Waker) {
        match slot {
            Some(token) => self
                .wakers
                .get_mut(token)
                .expect("waiter token is not part of this batch")
                .clone_from(waker),
            None => {
                let token = Token(self.next_token);
                self.next_token = self
                    .next_token
                    .get()
                    .checked_add(1)
                    .and_then(NonZeroUsize::new)
                    .expect("overflow when creating waiter token");

                self.wakers.insert(token.duplicate(), waker.clone());
                *slot = Some(token);
            }
        }
    }

    /// Same as `wait`, but also make this task the driver: it's the one whose
    /// waker was most recently handed to the loader future.
    pub(crate) fn drive(&mut self, slot: &mut Option<Token>, waker: &Waker) {
        self.wait(slot, waker);
        self.driver = slot.as_ref().map(Token::duplicate);
    }

    /// Remove a waiter that lost interest before completion. If it was the
    /// driver (or there is no driver), promote an arbitrary remaining waiter
    /// and wake it, so that it polls and picks up the loader future.
    pub(crate) fn leave(&mut self, token: Token) {
        self.wakers.remove(&token);

        if self.driver.is_none() || self.driver.as_ref() == Some(&token) {
            self.driver = self.wakers.iter().next().map(|(token, waker)| {
                waker.wake_by_ref();
                token.duplicate()
            });
        }
    }

    /// The batch is done; wake everybody except `finisher`, the task that
    /// completed it and is about to read its own result.
    pub(crate) fn finish(mut self, finisher: Option<Token>) {
        if let Some(token) = finisher {
            self.wakers.remove(&token);
        }

        self.wakers.into_iter().for_each(|(_token, waker)| waker.wake());
    }

    pub(crate) fn len(&self) -> usize {
        self.wakers.len()
    }
}
