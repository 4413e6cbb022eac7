use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub type ExtensionMap = HashMap<String, ExtensionValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Text(String),
}

impl ExtensionValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f32),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f32().is_some()
    }
}

impl From<bool> for ExtensionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for ExtensionValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<i64> for ExtensionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for ExtensionValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ExtensionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Typed read access for [`ExtensionValue`]. A value of the wrong variant reads as absent.
pub trait ExtensionType: Sized {
    fn from_extension(value: &ExtensionValue) -> Option<Self>;
}

impl ExtensionType for bool {
    fn from_extension(value: &ExtensionValue) -> Option<Self> {
        match value {
            ExtensionValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl ExtensionType for i64 {
    fn from_extension(value: &ExtensionValue) -> Option<Self> {
        match value {
            ExtensionValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl ExtensionType for i32 {
    fn from_extension(value: &ExtensionValue) -> Option<Self> {
        match value {
            ExtensionValue::Int(value) => i32::try_from(*value).ok(),
            _ => None,
        }
    }
}

impl ExtensionType for f32 {
    fn from_extension(value: &ExtensionValue) -> Option<Self> {
        value.as_f32()
    }
}

impl ExtensionType for String {
    fn from_extension(value: &ExtensionValue) -> Option<Self> {
        match value {
            ExtensionValue::Text(value) => Some(value.clone()),
            _ => None,
        }
    }
}

/// Names the extension keys that blend numerically during interpolation.
/// Every other key snaps from one side to the other at `t = 0.5`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionBlend {
    continuous_keys: HashSet<String>,
}

impl ExtensionBlend {
    pub fn new<I, S>(continuous_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            continuous_keys: continuous_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_continuous(&self, key: &str) -> bool {
        self.continuous_keys.contains(key)
    }

    pub(crate) fn blend(
        &self,
        a: Option<&ExtensionMap>,
        b: Option<&ExtensionMap>,
        t: f32,
    ) -> Option<ExtensionMap> {
        if a.is_none() && b.is_none() {
            return None;
        }

        let mut keys: Vec<&String> = a
            .into_iter()
            .chain(b)
            .flat_map(|map| map.keys())
            .collect();
        keys.sort();
        keys.dedup();

        let mut blended = ExtensionMap::with_capacity(keys.len());
        for key in keys {
            let from = lookup(a, key);
            let to = lookup(b, key);
            let numeric = from.map_or(true, ExtensionValue::is_numeric)
                && to.map_or(true, ExtensionValue::is_numeric);

            if self.is_continuous(key) && numeric {
                let from = from.and_then(ExtensionValue::as_f32).unwrap_or(0.0);
                let to = to.and_then(ExtensionValue::as_f32).unwrap_or(0.0);
                blended.insert(
                    key.clone(),
                    ExtensionValue::Float(super::lerp_f32(from, to, t)),
                );
                continue;
            }

            let (primary, fallback) = if t < 0.5 { (from, to) } else { (to, from) };
            if let Some(value) = primary.or(fallback) {
                blended.insert(key.clone(), value.clone());
            }
        }
        Some(blended)
    }
}

fn lookup<'a>(map: Option<&'a ExtensionMap>, key: &str) -> Option<&'a ExtensionValue> {
    map.and_then(|map| map.get(key))
}
