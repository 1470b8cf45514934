// Site domain model
use crate::domain::geometry::UnitGeometry;

/// A unit as declared in a site's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    pub id: String,
    pub description: String,
    pub geometry: UnitGeometry,
}

/// A physical installation with its report destinations and units, in
/// report order.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub destinations: Vec<String>,
    pub units: Vec<UnitSpec>,
}

impl Site {
    pub fn new(
        id: String,
        name: Option<String>,
        destinations: Vec<String>,
        units: Vec<UnitSpec>,
    ) -> Self {
        let name = name.unwrap_or_else(|| Self::format_name(&id));
        Self {
            id,
            name,
            destinations,
            units,
        }
    }

    pub fn unit(&self, unit_id: &str) -> Option<&UnitSpec> {
        self.units.iter().find(|u| u.id == unit_id)
    }

    fn format_name(id: &str) -> String {
        // Convert "fazenda_jk" to "Fazenda Jk"
        id.split(['_', ' '])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

/// All configured sites, looked up by id.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Site>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    pub fn get(&self, site_id: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.id == site_id)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
