use serde::de::DeserializeOwned;

/// Deserialize with JSON-path context in error messages. Fragment
/// bundle files are hand-written often enough that "at JSON path
/// .types.Edge.fields[1]" beats a bare line/column pair.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_str(src);
    match serde_path_to_error::deserialize::<_, T>(de) {
        Ok(v) => Ok(v),
        Err(err) => {
            let path = err.path().to_string();
            Err(format!("at JSON path {path} → {}", err.into_inner()))
        }
    }
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    let de = &mut serde_json::Deserializer::from_slice(bytes);
    match serde_path_to_error::deserialize::<_, T>(de) {
        Ok(v) => Ok(v),
        Err(err) => {
            let path = err.path().to_string();
            Err(format!("at JSON path {path} → {}", err.into_inner()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::FragmentBundle;

    #[test]
    fn bundle_errors_carry_a_json_path() {
        let src = r#"{
            "name": "X", "root": "T",
            "types": { "T": { "fields": [ { "wire_name": "__typename", "kind": "nope" } ] } }
        }"#;
        let err = from_str_with_path::<FragmentBundle>(src).unwrap_err();
        assert!(err.contains("types.T.fields"), "got: {err}");
    }
}
