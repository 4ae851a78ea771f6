use std::fs;
use std::path::Path;
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::utils::utils_errors::ReactError;

/// Objects that can be written to and read back from a json file on disk.
pub trait SaveAndLoadable: Serialize + DeserializeOwned {
    fn get_serialization_string(&self) -> Result<String, ReactError> {
        return serde_json::to_string_pretty(self).map_err(|e| ReactError::new_config_load_error("json", &e.to_string(), file!(), line!()));
    }
    fn save_to_path(&self, path: &Path) -> Result<(), ReactError> {
        let s = self.get_serialization_string()?;
        return fs::write(path, s).map_err(|e| ReactError::new_config_load_error("json", &format!("Could not write {:?}: {}", path, e), file!(), line!()));
    }
    fn load_from_path(path: &Path) -> Result<Self, ReactError> where Self: Sized {
        let s = fs::read_to_string(path).map_err(|e| ReactError::new_config_load_error("json", &format!("Could not read {:?}: {}", path, e), file!(), line!()))?;
        return Self::load_from_json_string(&s);
    }
    fn load_from_json_string(json_str: &str) -> Result<Self, ReactError> where Self: Sized {
        return serde_json::from_str(json_str).map_err(|e| ReactError::new_config_load_error("json", &e.to_string(), file!(), line!()));
    }
}
impl <T> SaveAndLoadable for T where T: Serialize + DeserializeOwned { }

pub trait ToAndFromRonString: Serialize + DeserializeOwned {
    fn convert_to_ron_string(&self) -> Result<String, ReactError> {
        return ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()).map_err(|e| ReactError::new_config_load_error("ron", &e.to_string(), file!(), line!()));
    }
    fn load_from_ron_string(ron_string: &str) -> Result<Self, ReactError> where Self: Sized {
        let load: Result<Self, _> = ron::from_str(ron_string);
        return match load {
            Ok(load) => { Ok(load) }
            Err(e) => { Err(ReactError::new_config_load_error("ron", &format!("Could not load ron string into correct type: {}", e), file!(), line!())) }
        }
    }
}
impl <T> ToAndFromRonString for T where T: Serialize + DeserializeOwned { }

pub trait ToAndFromTomlString: Serialize + DeserializeOwned {
    fn convert_to_toml_string(&self) -> Result<String, ReactError> {
        return toml::to_string(self).map_err(|e| ReactError::new_config_load_error("toml", &e.to_string(), file!(), line!()));
    }
    fn load_from_toml_string(toml_string: &str) -> Result<Self, ReactError> where Self: Sized {
        return toml::from_str(toml_string).map_err(|e| ReactError::new_config_load_error("toml", &e.to_string(), file!(), line!()));
    }
}
impl <T> ToAndFromTomlString for T where T: Serialize + DeserializeOwned { }

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Gains {
        kp: f64,
        kd: f64,
        name: String
    }

    #[test]
    fn ron_and_toml_strings_load_back() {
        let g = Gains { kp: 2.0, kd: 0.5, name: "arm".to_string() };
        let ron_string = g.convert_to_ron_string().unwrap();
        assert_eq!(Gains::load_from_ron_string(&ron_string).unwrap(), g);
        let toml_string = g.convert_to_toml_string().unwrap();
        assert_eq!(Gains::load_from_toml_string(&toml_string).unwrap(), g);
    }

    #[test]
    fn malformed_input_is_a_config_load_error() {
        let e = Gains::load_from_json_string("{ \"kp\": 1.0 }").unwrap_err();
        assert!(matches!(e, ReactError::ConfigLoadError(_)));
        let e = Gains::load_from_ron_string("(kp: )").unwrap_err();
        assert!(matches!(e, ReactError::ConfigLoadError(_)));
    }
}
