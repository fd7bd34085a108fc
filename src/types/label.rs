use {
    schemars::JsonSchema,
    serde::{
        de::{self, Deserialize, Deserializer, Visitor},
        ser::{Serialize, Serializer},
    },
    std::fmt,
};

/// A variable-width label path: the sequence of labels leading from a root to
/// a node, each label a non-empty string over `[0-9A-Z]`.
///
/// Paths compare label by label, which (because the dot separator sorts below
/// every label symbol) is exactly how their dotted renderings compare as raw
/// strings. The dotted rendering is therefore used both as the serialized
/// form and as the ordered store key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
pub struct LabelPath(Vec<String>);

impl LabelPath {
    pub fn empty() -> Self {
        Self(vec![])
    }

    pub fn root(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of labels, which is also the depth of the node.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    // panics on an empty path
    pub fn last_label(&self) -> &str {
        self.0.last().expect("empty label path")
    }

    pub fn child(&self, label: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.0.push(label.into());
        path
    }

    /// The path shortened to its first `n` labels.
    pub fn crop(&self, n: usize) -> Self {
        Self(self.0[..n.min(self.0.len())].to_vec())
    }

    /// The parent path; empty when the path is a root (or empty).
    pub fn parent(&self) -> Self {
        self.crop(self.0.len().saturating_sub(1))
    }

    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Re-root the path: drop the first `prefix_len` labels and put
    /// `new_prefix` in their place.
    pub fn replace_prefix(&self, prefix_len: usize, new_prefix: &Self) -> Self {
        let mut labels = new_prefix.0.clone();
        labels.extend_from_slice(&self.0[prefix_len..]);
        Self(labels)
    }

    /// Whether every label is non-empty and drawn from `[0-9A-Z]`.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.iter().all(|label| {
                !label.is_empty()
                    && label.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
            })
    }

    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            Self::empty()
        } else {
            Self(s.split('.').map(str::to_string).collect())
        }
    }
}

impl fmt::Display for LabelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl fmt::Debug for LabelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelPath(\"{self}\")")
    }
}

impl FromIterator<String> for LabelPath {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for LabelPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LabelPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(LabelPathVisitor)
    }
}

struct LabelPathVisitor;

impl<'de> Visitor<'de> for LabelPathVisitor {
    type Value = LabelPath;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a dotted label path")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(LabelPath::parse(v))
    }
}
