use crate::error::SelectorError;
use crate::model::Routine;

/// Ordered, fixed set of routines the operator can choose from.
#[derive(Debug)]
pub struct RoutineRegistry {
    routines: Vec<Routine>,
}

impl RoutineRegistry {
    pub fn new(routines: Vec<Routine>) -> Result<Self, SelectorError> {
        if routines.is_empty() {
            return Err(SelectorError::InvalidConfiguration(
                "at least one routine is required".into(),
            ));
        }
        if let Some(pos) = routines.iter().position(|r| r.name.trim().is_empty()) {
            return Err(SelectorError::InvalidConfiguration(format!(
                "routine #{} has an empty name",
                pos + 1
            )));
        }
        Ok(Self { routines })
    }

    pub fn get(&self, index: usize) -> Result<&Routine, SelectorError> {
        self.routines
            .get(index)
            .ok_or_else(|| SelectorError::out_of_range(index, self.routines.len()))
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Routine> {
        self.routines.iter()
    }

    /// Name lookup used by headless `--select <name>`. First match wins.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.routines.iter().position(|r| r.name == name)
    }
}
