// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles site names, numeric strings, nullable lists, and the ordered site map.

use serde::Deserialize;
use serde::de::Error as _;
use std::str::FromStr;

use super::SiteConfig;
use crate::types::SiteName;

pub fn deserialize_site_name<'de, D>(deserializer: D) -> Result<SiteName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    SiteName::new(&s).map_err(serde::de::Error::custom)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    Text(String),
}

fn parse_number<T, E>(raw: NumberOrString<T>) -> Result<T, E>
where
    T: FromStr,
    E: serde::de::Error,
{
    match raw {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| E::custom(format!("expected a number, got '{}'", s))),
    }
}

/// Accept `5` as well as `"5"`.
pub fn deserialize_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
{
    parse_number(NumberOrString::<T>::deserialize(deserializer)?)
}

pub fn deserialize_opt_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
{
    Option::<NumberOrString<T>>::deserialize(deserializer)?
        .map(parse_number)
        .transpose()
}

/// A key present with no value (`shared_files:`) is an empty list.
pub fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize the top-level `site-name: {...}` mapping, keeping file order.
///
/// The mapping key becomes the site's `name`, overriding any `name` field
/// written inside the entry.
pub fn deserialize_sites<'de, D>(deserializer: D) -> Result<Vec<SiteConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(mapping) = Option::<serde_yaml::Mapping>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    let mut sites = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| D::Error::custom("site names must be strings"))?
            .to_string();

        let mut entry = match value {
            serde_yaml::Value::Mapping(entry) => entry,
            _ => return Err(D::Error::custom(format!("site '{}' must be a mapping", name))),
        };
        entry.insert(
            serde_yaml::Value::String("name".to_string()),
            serde_yaml::Value::String(name.clone()),
        );

        let site: SiteConfig = serde_yaml::from_value(serde_yaml::Value::Mapping(entry))
            .map_err(|e| D::Error::custom(format!("site '{}': {}", name, e)))?;
        sites.push(site);
    }

    Ok(sites)
}
