//! Runtime discovery of optional driver capabilities.
//!
//! Every layer of the driver protocol has a fixed table of optional
//! operations. [`probe`] evaluates that table against a concrete object and
//! returns the subset it implements. Proxies cache the result when they are
//! built and answer their own `as_*` accessors from it.

use std::fmt;
use std::marker::PhantomData;

use crate::driver::{Conn, Connector, Driver, Stmt};
use crate::error::Layer;

/// One optional operation of a protocol layer.
pub trait Capability: Copy + Eq + fmt::Debug + 'static {
    /// The layer object this capability is probed on.
    type Target: ?Sized;

    const LAYER: Layer;

    /// Every capability of the layer, in probe order.
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    /// Whether `target` implements this capability.
    fn supported_by(self, target: &Self::Target) -> bool;

    fn bit(self) -> u32 {
        let index = Self::ALL
            .iter()
            .position(|c| *c == self)
            .unwrap_or_default();
        1 << index
    }
}

/// Probe `target` for every optional capability of its layer.
pub fn probe<C: Capability>(target: &C::Target) -> CapabilitySet<C> {
    C::ALL
        .iter()
        .copied()
        .filter(|c| c.supported_by(target))
        .collect()
}

/// A set of capabilities of a single layer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilitySet<C> {
    bits: u32,
    _layer: PhantomData<C>,
}

impl<C: Capability> CapabilitySet<C> {
    pub fn empty() -> Self {
        Self {
            bits: 0,
            _layer: PhantomData,
        }
    }

    pub fn all() -> Self {
        C::ALL.iter().copied().collect()
    }

    pub fn contains(&self, capability: C) -> bool {
        self.bits & capability.bit() != 0
    }

    pub fn insert(&mut self, capability: C) {
        self.bits |= capability.bit();
    }

    pub fn remove(&mut self, capability: C) {
        self.bits &= !capability.bit();
    }

    pub fn with(mut self, capability: C) -> Self {
        self.insert(capability);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = C> + '_ {
        C::ALL.iter().copied().filter(move |c| self.contains(*c))
    }

    /// Capabilities in `self` that are missing from `other`.
    pub fn difference(&self, other: &Self) -> impl Iterator<Item = C> + '_ {
        let missing = self.bits & !other.bits;
        C::ALL
            .iter()
            .copied()
            .filter(move |c| missing & c.bit() != 0)
    }
}

impl<C: Capability> Default for CapabilitySet<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<C: Capability> FromIterator<C> for CapabilitySet<C> {
    fn from_iter<I: IntoIterator<Item = C>>(iter: I) -> Self {
        let mut set = Self::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl<C: Capability> fmt::Debug for CapabilitySet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|c| c.name())).finish()
    }
}

/// Optional operations of a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCapability {
    OpenConnector,
}

impl Capability for DriverCapability {
    type Target = dyn Driver;
    const LAYER: Layer = Layer::Driver;
    const ALL: &'static [Self] = &[DriverCapability::OpenConnector];

    fn name(self) -> &'static str {
        match self {
            DriverCapability::OpenConnector => "open_connector",
        }
    }

    fn supported_by(self, driver: &Self::Target) -> bool {
        match self {
            DriverCapability::OpenConnector => driver.as_driver_context().is_some(),
        }
    }
}

/// Optional operations of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorCapability {
    Close,
}

impl Capability for ConnectorCapability {
    type Target = dyn Connector;
    const LAYER: Layer = Layer::Connector;
    const ALL: &'static [Self] = &[ConnectorCapability::Close];

    fn name(self) -> &'static str {
        match self {
            ConnectorCapability::Close => "close",
        }
    }

    fn supported_by(self, connector: &Self::Target) -> bool {
        match self {
            ConnectorCapability::Close => connector.as_closer().is_some(),
        }
    }
}

/// Optional operations of a [`Conn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnCapability {
    Query,
    QueryContext,
    Exec,
    ExecContext,
    PrepareContext,
    BeginTx,
    Ping,
}

impl Capability for ConnCapability {
    type Target = dyn Conn;
    const LAYER: Layer = Layer::Connection;
    const ALL: &'static [Self] = &[
        ConnCapability::Query,
        ConnCapability::QueryContext,
        ConnCapability::Exec,
        ConnCapability::ExecContext,
        ConnCapability::PrepareContext,
        ConnCapability::BeginTx,
        ConnCapability::Ping,
    ];

    fn name(self) -> &'static str {
        match self {
            ConnCapability::Query => "query",
            ConnCapability::QueryContext => "query_context",
            ConnCapability::Exec => "exec",
            ConnCapability::ExecContext => "exec_context",
            ConnCapability::PrepareContext => "prepare_context",
            ConnCapability::BeginTx => "begin_tx",
            ConnCapability::Ping => "ping",
        }
    }

    fn supported_by(self, conn: &Self::Target) -> bool {
        match self {
            ConnCapability::Query => conn.as_queryer().is_some(),
            ConnCapability::QueryContext => conn.as_queryer_context().is_some(),
            ConnCapability::Exec => conn.as_execer().is_some(),
            ConnCapability::ExecContext => conn.as_execer_context().is_some(),
            ConnCapability::PrepareContext => conn.as_prepare_context().is_some(),
            ConnCapability::BeginTx => conn.as_begin_tx().is_some(),
            ConnCapability::Ping => conn.as_pinger().is_some(),
        }
    }
}

/// Optional operations of a [`Stmt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StmtCapability {
    ExecContext,
    QueryContext,
}

impl Capability for StmtCapability {
    type Target = dyn Stmt;
    const LAYER: Layer = Layer::Statement;
    const ALL: &'static [Self] = &[StmtCapability::ExecContext, StmtCapability::QueryContext];

    fn name(self) -> &'static str {
        match self {
            StmtCapability::ExecContext => "exec_context",
            StmtCapability::QueryContext => "query_context",
        }
    }

    fn supported_by(self, stmt: &Self::Target) -> bool {
        match self {
            StmtCapability::ExecContext => stmt.as_exec_context().is_some(),
            StmtCapability::QueryContext => stmt.as_query_context().is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_are_distinct() {
        let mut seen = 0u32;
        for c in ConnCapability::ALL {
            assert_eq!(seen & c.bit(), 0, "{c:?} shares a bit");
            seen |= c.bit();
        }
    }

    #[test]
    fn test_set_operations() {
        let mut set = CapabilitySet::empty()
            .with(ConnCapability::Query)
            .with(ConnCapability::Exec);
        assert_eq!(set.len(), 2);
        assert!(set.contains(ConnCapability::Query));
        assert!(!set.contains(ConnCapability::Ping));

        set.remove(ConnCapability::Query);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![ConnCapability::Exec]);
    }

    #[test]
    fn test_all_and_difference() {
        let all = CapabilitySet::<StmtCapability>::all();
        let some = CapabilitySet::empty().with(StmtCapability::QueryContext);
        assert_eq!(
            all.difference(&some).collect::<Vec<_>>(),
            vec![StmtCapability::ExecContext]
        );
        assert!(some.difference(&all).next().is_none());
    }

    #[test]
    fn test_debug_lists_names() {
        let set = CapabilitySet::empty().with(ConnCapability::Ping);
        assert_eq!(format!("{set:?}"), r#"{"ping"}"#);
    }
}
