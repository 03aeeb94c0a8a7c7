use serde::{Deserialize, Deserializer, Serialize};

/// Reference from one entity to another it depends on.
///
/// Either side may be missing: desired configuration usually names the
/// target, the admin API echoes only its id. A bare string in YAML is read as
/// a name (`service: billing`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ForeignRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ForeignRef {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// Best lookup key: the id when known, else the name.
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }

    /// `true` when both references provably point at the same entity.
    ///
    /// Ids win when both sides carry one; otherwise names are compared. A
    /// reference known only by id never equals one known only by name.
    pub fn same_target(&self, other: &ForeignRef) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => match (&self.name, &other.name) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.id.is_none()
    }
}

/// `same_target` lifted over optional associations.
pub fn same_optional_target(a: Option<&ForeignRef>, b: Option<&ForeignRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_target(b),
        _ => false,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RefRepr {
    Name(String),
    Full {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl<'de> Deserialize<'de> for ForeignRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RefRepr::deserialize(deserializer)? {
            RefRepr::Name(name) => ForeignRef::by_name(name),
            RefRepr::Full { id, name } => ForeignRef { id, name },
        })
    }
}
