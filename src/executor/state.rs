//! Swap executor states

use serde::Serialize;

use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapState {
    Idle,
    Wrapping,
    Approving,
    Submitting,
    Confirming,
    Unwrapping,
    Done,
    Failed(FailureKind),
}

impl SwapState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapState::Done | SwapState::Failed(_))
    }

    /// Once submitted the swap can only be awaited
    pub fn is_cancellable(&self) -> bool {
        matches!(self, SwapState::Idle | SwapState::Wrapping | SwapState::Approving)
    }
}

impl std::fmt::Display for SwapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapState::Idle => write!(f, "Idle"),
            SwapState::Wrapping => write!(f, "Wrapping"),
            SwapState::Approving => write!(f, "Approving"),
            SwapState::Submitting => write!(f, "Submitting"),
            SwapState::Confirming => write!(f, "Confirming"),
            SwapState::Unwrapping => write!(f, "Unwrapping"),
            SwapState::Done => write!(f, "Done"),
            SwapState::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}

/// Which legs of a swap involve the native currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapShape {
    TokenToToken,
    NativeToToken,
    TokenToNative,
}

impl SwapShape {
    /// `None` for native to native
    pub fn of(native_in: bool, native_out: bool) -> Option<Self> {
        match (native_in, native_out) {
            (false, false) => Some(SwapShape::TokenToToken),
            (true, false) => Some(SwapShape::NativeToToken),
            (false, true) => Some(SwapShape::TokenToNative),
            (true, true) => None,
        }
    }

    pub fn wraps(&self) -> bool {
        *self == SwapShape::NativeToToken
    }

    pub fn unwraps(&self) -> bool {
        *self == SwapShape::TokenToNative
    }

    /// State sequence of a successful run
    pub fn happy_path(&self) -> Vec<SwapState> {
        let mut states = vec![SwapState::Idle];
        if self.wraps() {
            states.push(SwapState::Wrapping);
        }
        states.extend([SwapState::Approving, SwapState::Submitting, SwapState::Confirming]);
        if self.unwraps() {
            states.push(SwapState::Unwrapping);
        }
        states.push(SwapState::Done);
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_paths() {
        use SwapState::*;
        assert_eq!(
            SwapShape::TokenToToken.happy_path(),
            vec![Idle, Approving, Submitting, Confirming, Done]
        );
        assert_eq!(
            SwapShape::NativeToToken.happy_path(),
            vec![Idle, Wrapping, Approving, Submitting, Confirming, Done]
        );
        assert_eq!(
            SwapShape::TokenToNative.happy_path(),
            vec![Idle, Approving, Submitting, Confirming, Unwrapping, Done]
        );
        assert_eq!(SwapShape::of(true, true), None);
    }

    #[test]
    fn test_state_flags() {
        assert!(SwapState::Failed(FailureKind::Timeout).is_terminal());
        assert!(!SwapState::Confirming.is_cancellable());
        assert_eq!(
            SwapState::Failed(FailureKind::ConfigMismatch).to_string(),
            "Failed(ConfigMismatch)"
        );
    }
}
