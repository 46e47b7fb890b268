//! Identity tokens for layouts and layout strategies.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Identity of one realized [`TypeLayout`](crate::TypeLayout).
///
/// Tokens are handed out once per layout and never reused, so comparing tokens
/// is equivalent to comparing layouts by address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeToken(u64);

static NEXT_TYPE_TOKEN: AtomicU64 = AtomicU64::new(1);

impl TypeToken {
    pub(crate) fn next() -> Self {
        Self(NEXT_TYPE_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeToken({})", self.0)
    }
}

/// Identity of a layout strategy.
///
/// Used to narrow a generic layout to the strategy that produced it, see
/// [`TypeLayout::narrow`](crate::TypeLayout::narrow).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyToken(&'static str);

impl StrategyToken {
    pub const COMPUTED: StrategyToken = StrategyToken("computed");
    pub const EXTERNAL: StrategyToken = StrategyToken("external");

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for StrategyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrategyToken({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tokens_are_unique() {
        let a = TypeToken::next();
        let b = TypeToken::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn strategy_tokens_differ() {
        assert_ne!(StrategyToken::COMPUTED, StrategyToken::EXTERNAL);
        assert_eq!(StrategyToken::COMPUTED.name(), "computed");
    }
}
