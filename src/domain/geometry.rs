// Unit geometry: cables and the arcs that group them
use serde::Deserialize;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitGeometry {
    /// Sensor count per cable, in cable order.
    pub cables: Vec<usize>,
    /// Sizes of contiguous cable groups. `None` means one arc per cable.
    #[serde(default)]
    pub arcs: Option<Vec<usize>>,
}

impl UnitGeometry {
    pub fn new(cables: Vec<usize>, arcs: Option<Vec<usize>>) -> Self {
        Self { cables, arcs }
    }

    pub fn has_declared_arcs(&self) -> bool {
        self.arcs.as_ref().is_some_and(|arcs| !arcs.is_empty())
    }

    pub fn total_sensors(&self) -> usize {
        self.cables.iter().sum()
    }

    /// Cable index ranges for each arc, in order.
    ///
    /// Declared arcs are consumed until cables run out; zero-sized arcs are
    /// skipped and any cables past the declared arcs form one trailing arc.
    pub fn arc_groups(&self) -> Vec<Range<usize>> {
        let total = self.cables.len();

        let Some(arcs) = self.arcs.as_ref().filter(|arcs| !arcs.is_empty()) else {
            return (0..total).map(|i| i..i + 1).collect();
        };

        let mut groups = Vec::with_capacity(arcs.len() + 1);
        let mut start = 0;
        for &size in arcs {
            if start >= total {
                break;
            }
            if size == 0 {
                continue;
            }
            let end = (start + size).min(total);
            groups.push(start..end);
            start = end;
        }

        if start < total {
            groups.push(start..total);
        }

        groups
    }
}
