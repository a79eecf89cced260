use super::*;

/// `mining.set_target` parameters: a single 64 character target.
#[derive(Debug, PartialEq, Clone)]
pub struct SetTarget(pub String);

impl Serialize for SetTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element(&self.0)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SetTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (target,) = <(String,)>::deserialize(deserializer)?;
        Ok(SetTarget(target))
    }
}
