use super::{Flags, Variable};
use crate::error::{Location, ParseError};
use crate::rule::RuleKind;
use crate::VariableId;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// The variables of a TrafCOD program, in definition order.
#[derive(Clone, Debug, Default)]
pub struct VariableTable {
    /// The variables.
    variables: SlotMap<VariableId, Variable>,
    /// The variables in the order in which they were first referenced.
    order: Vec<VariableId>,
    /// Look up by name and stream.
    index: HashMap<(String, Option<u8>), VariableId>,
}

impl VariableTable {
    /// Creates an empty variable table.
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the variable with the given name and stream, creating it if needed.
    pub fn install(&mut self, name: &str, stream: Option<u8>) -> VariableId {
        let key = (name.to_ascii_uppercase(), stream);
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.variables.insert(Variable::new(&key.0, stream));
        self.order.push(id);
        self.index.insert(key, id);
        id
    }

    /// Installs the destination of a rule and records the rule as its start
    /// and/or end source.
    pub fn install_target(
        &mut self,
        name: &str,
        stream: Option<u8>,
        kind: RuleKind,
        location: Location,
    ) -> Result<VariableId, ParseError> {
        let id = self.install(name, stream);
        let var = &mut self.variables[id];
        match kind {
            RuleKind::Start | RuleKind::InitTimer | RuleKind::ReinitTimer => {
                var.set_start_source(location)?;
            }
            RuleKind::End => var.set_end_source(location)?,
            RuleKind::Equals | RuleKind::NegEquals => {
                var.set_start_source(location)?;
                var.set_end_source(location)?;
            }
        }
        Ok(id)
    }

    /// Finds the variable with the given name and stream.
    pub fn lookup(&self, name: &str, stream: Option<u8>) -> Option<VariableId> {
        self.index
            .get(&(name.to_ascii_uppercase(), stream))
            .copied()
    }

    /// Finds the detector variable driven by the given sensor id, e.g. `D011`.
    pub fn detector(&self, sensor_id: &str) -> Option<VariableId> {
        self.iter()
            .find(|(_, var)| var.sensor_id().as_deref() == Some(sensor_id))
            .map(|(id, _)| id)
    }

    /// Gets the variable with the given id, if it exists.
    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id)
    }

    /// Returns an iterator over the variables in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &Variable)> + '_ {
        self.order.iter().map(|id| (*id, &self.variables[*id]))
    }

    /// Returns a mutable iterator over the variables, in no particular order.
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Variable> + '_ {
        self.variables.values_mut()
    }

    /// Returns the variable ids in definition order.
    pub fn ids(&self) -> &[VariableId] {
        &self.order
    }

    /// Returns the variables in definition order that have all of the given flags.
    pub fn with_flags(&self, flags: Flags) -> impl Iterator<Item = VariableId> + '_ {
        self.iter()
            .filter(move |(_, var)| var.flags().contains(flags))
            .map(|(id, _)| id)
    }

    /// Gets the number of variables.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Index<VariableId> for VariableTable {
    type Output = Variable;

    fn index(&self, id: VariableId) -> &Variable {
        &self.variables[id]
    }
}

impl IndexMut<VariableId> for VariableTable {
    fn index_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn install_or_get() {
        let mut table = VariableTable::new();
        let a = table.install("a", Some(1));
        let b = table.install("B", None);
        assert_eq!(table.install("A", Some(1)), a);
        assert_ne!(table.install("A", None), a);
        assert_eq!(table.len(), 3);
        assert_eq!(table.ids()[..2], [a, b]);
        assert_eq!(table.lookup("b", None), Some(b));
        assert_eq!(table.lookup("C", None), None);
    }

    #[test]
    fn target_sources() {
        let mut table = VariableTable::new();
        let loc = |line| Location { line };
        table
            .install_target("A", None, RuleKind::Start, loc(1))
            .unwrap();
        table.install_target("A", None, RuleKind::End, loc(2)).unwrap();
        assert!(matches!(
            table.install_target("A", None, RuleKind::Equals, loc(3)),
            Err(ParseError::ConflictingRules { .. })
        ));
        table
            .install_target("TB", None, RuleKind::InitTimer, loc(4))
            .unwrap();
        let tb = table.lookup("TB", None).unwrap();
        assert_eq!(table[tb].start_source(), Some(loc(4)));
        assert_eq!(table[tb].end_source(), None);
    }

    #[test]
    fn detector_lookup() {
        let mut table = VariableTable::new();
        let det = table.install("D1", Some(8));
        table.install("A", Some(8));
        assert_eq!(table.detector("D081"), Some(det));
        assert_eq!(table.detector("D082"), None);
    }
}
