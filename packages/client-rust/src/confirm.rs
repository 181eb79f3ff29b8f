//! Two-phase confirmation for destructive actions and layout saves.
//!
//! An action that needs the user's consent is wrapped in a [`Confirmation`].
//! The only way to obtain a [`Confirmed`] value, which is what executors
//! accept, is to call [`Confirmation::confirm`]. Cancelling consumes the
//! proposal and does nothing else.

use tracing::debug;
use uuid::Uuid;

/// A proposed action waiting for the user's answer.
#[derive(Debug)]
#[must_use = "a confirmation does nothing until it is confirmed or cancelled"]
pub struct Confirmation<A> {
    id: Uuid,
    prompt: String,
    action: A,
}

impl<A> Confirmation<A> {
    pub fn new(prompt: impl Into<String>, action: A) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            action,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Question to put to the user.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The action that will run if confirmed.
    #[must_use]
    pub fn action(&self) -> &A {
        &self.action
    }

    pub fn confirm(self) -> Confirmed<A> {
        debug!(id = %self.id, "action confirmed");
        Confirmed {
            id: self.id,
            action: self.action,
        }
    }

    /// Drops the proposal.
    pub fn cancel(self) {
        debug!(id = %self.id, "action cancelled");
    }
}

/// An action the user has agreed to.
#[derive(Debug)]
pub struct Confirmed<A> {
    id: Uuid,
    action: A,
}

impl<A> Confirmed<A> {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn action(&self) -> &A {
        &self.action
    }

    #[must_use]
    pub fn into_inner(self) -> A {
        self.action
    }
}

/// Result of preparing an action: either runnable now, or gated.
///
/// Only the crate's preparers decide which side an action lands on. Outside
/// code cannot gate, or un-gate, an action itself:
///
/// ```compile_fail
/// use backoffice_client::Prepared;
///
/// let _ = Prepared::gate("delete", false, |_| String::new());
/// ```
#[derive(Debug)]
pub enum Prepared<A> {
    Ready(Confirmed<A>),
    NeedsConfirmation(Confirmation<A>),
}

impl<A> Prepared<A> {
    /// Wraps `action`, gating it behind a prompt when `gated` is true.
    pub(crate) fn gate(action: A, gated: bool, prompt: impl FnOnce(&A) -> String) -> Self {
        if gated {
            let prompt = prompt(&action);
            Self::NeedsConfirmation(Confirmation::new(prompt, action))
        } else {
            Self::Ready(Confirmed {
                id: Uuid::new_v4(),
                action,
            })
        }
    }

    #[must_use]
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::NeedsConfirmation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirming_keeps_identity_and_action() {
        let pending = Confirmation::new("Delete 3 rows?", vec![1, 2, 3]);
        let id = pending.id();
        assert_eq!(pending.prompt(), "Delete 3 rows?");

        let confirmed = pending.confirm();
        assert_eq!(confirmed.id(), id);
        assert_eq!(confirmed.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn gate_only_prompts_when_asked() {
        let open = Prepared::gate("refresh", false, |_| unreachable!());
        assert!(!open.needs_confirmation());

        let gated = Prepared::gate("delete", true, |a| format!("Really {a}?"));
        match gated {
            Prepared::NeedsConfirmation(c) => {
                assert_eq!(c.prompt(), "Really delete?");
                c.cancel();
            }
            Prepared::Ready(_) => panic!("delete must be gated"),
        }
    }
}
