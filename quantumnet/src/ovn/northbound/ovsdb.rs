//! OVSDB values as they appear on an `ovn-nbctl` command line and in its JSON output.

use std::collections::{BTreeMap, HashMap};
use serde_json::Value;
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

#[derive(Debug, Clone, PartialEq)]
pub enum OvsdbValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Uuid(String),
    Set(Vec<OvsdbValue>),
    Map(Vec<(OvsdbValue, OvsdbValue)>),
}

impl OvsdbValue {
    pub fn string(value: impl Into<String>) -> Self {
        OvsdbValue::String(value.into())
    }

    pub fn strings(values: &[String]) -> Self {
        OvsdbValue::Set(values.iter().cloned().map(OvsdbValue::String).collect())
    }

    pub fn uuids(values: &[String]) -> Self {
        OvsdbValue::Set(values.iter().cloned().map(OvsdbValue::Uuid).collect())
    }

    /// Optional columns are sets of zero or one value.
    pub fn optional_string(value: Option<&String>) -> Self {
        OvsdbValue::Set(value.cloned().map(OvsdbValue::String).into_iter().collect())
    }

    pub fn optional_uuid(value: Option<&String>) -> Self {
        OvsdbValue::Set(value.cloned().map(OvsdbValue::Uuid).into_iter().collect())
    }

    pub fn optional_integer(value: Option<i64>) -> Self {
        OvsdbValue::Set(value.map(OvsdbValue::Integer).into_iter().collect())
    }

    pub fn optional_boolean(value: Option<bool>) -> Self {
        OvsdbValue::Set(value.map(OvsdbValue::Boolean).into_iter().collect())
    }

    pub fn string_map(map: &BTreeMap<String, String>) -> Self {
        OvsdbValue::Map(map.iter()
            .map(|(key, value)| (OvsdbValue::string(key), OvsdbValue::string(value)))
            .collect())
    }

    /// Render in the database command syntax `ovn-nbctl` parses for column values. Strings are
    /// always quoted so names with `-`, `:` or spaces survive.
    pub fn to_nbctl(&self) -> String {
        match self {
            OvsdbValue::String(text) => quote(text),
            OvsdbValue::Integer(number) => number.to_string(),
            OvsdbValue::Boolean(flag) => flag.to_string(),
            OvsdbValue::Uuid(uuid) => uuid.clone(),
            OvsdbValue::Set(items) => {
                let items: Vec<_> = items.iter().map(OvsdbValue::to_nbctl).collect();
                format!("[{}]", items.join(","))
            }
            OvsdbValue::Map(entries) => {
                let entries: Vec<_> = entries.iter()
                    .map(|(key, value)| format!("{}={}", key.to_nbctl(), value.to_nbctl()))
                    .collect();
                format!("{{{}}}", entries.join(","))
            }
        }
    }

    /// Parse one value of `--format=json --data=json` output.
    pub fn from_json(value: &Value) -> Result<Self, NorthboundError> {
        match value {
            Value::String(text) => Ok(OvsdbValue::String(text.clone())),
            Value::Bool(flag) => Ok(OvsdbValue::Boolean(*flag)),
            Value::Number(number) => number.as_i64()
                .map(OvsdbValue::Integer)
                .ok_or_else(|| NorthboundError::backend(format!("unsupported number {number}"))),
            Value::Array(pair) if pair.len() == 2 => {
                match (pair[0].as_str(), &pair[1]) {
                    (Some("uuid") | Some("named-uuid"), Value::String(uuid)) => Ok(OvsdbValue::Uuid(uuid.clone())),
                    (Some("set"), Value::Array(items)) => Ok(OvsdbValue::Set(
                        items.iter().map(OvsdbValue::from_json).collect::<Result<_, _>>()?)),
                    (Some("map"), Value::Array(entries)) => {
                        let mut map = Vec::with_capacity(entries.len());
                        for entry in entries {
                            match entry.as_array().map(Vec::as_slice) {
                                Some([key, value]) => map.push((OvsdbValue::from_json(key)?, OvsdbValue::from_json(value)?)),
                                _ => return Err(NorthboundError::backend(format!("bad map entry {entry}"))),
                            }
                        }
                        Ok(OvsdbValue::Map(map))
                    }
                    _ => Err(NorthboundError::backend(format!("unsupported value {value}"))),
                }
            }
            other => Err(NorthboundError::backend(format!("unsupported value {other}"))),
        }
    }

    /// The text of a single atom.
    fn atom_text(&self) -> Option<String> {
        match self {
            OvsdbValue::String(text) | OvsdbValue::Uuid(text) => Some(text.clone()),
            OvsdbValue::Integer(number) => Some(number.to_string()),
            OvsdbValue::Boolean(flag) => Some(flag.to_string()),
            OvsdbValue::Set(_) | OvsdbValue::Map(_) => None,
        }
    }

    /// A set with one element is written as the bare element, so an optional column is either
    /// an atom or a set of zero or one atoms.
    fn optional_atom(&self) -> Result<Option<&OvsdbValue>, ()> {
        match self {
            OvsdbValue::Set(items) if items.is_empty() => Ok(None),
            OvsdbValue::Set(items) if items.len() == 1 => Ok(items.first()),
            OvsdbValue::Set(_) | OvsdbValue::Map(_) => Err(()),
            atom => Ok(Some(atom)),
        }
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// One row of `find` output, columns by heading.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub columns: HashMap<String, OvsdbValue>,
}

impl Row {
    /// Parse the `{"headings": [...], "data": [[...], ...]}` document `ovn-nbctl --format=json
    /// --data=json` prints.
    pub fn from_find_output(text: &str) -> Result<Vec<Row>, NorthboundError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let document: Value = serde_json::from_str(text)
            .map_err(|err| NorthboundError::backend(format!("could not parse ovn-nbctl output: {err}")))?;
        let headings: Vec<String> = document.get("headings")
            .and_then(Value::as_array)
            .ok_or_else(|| NorthboundError::backend("ovn-nbctl output has no headings"))?
            .iter()
            .map(|heading| heading.as_str().map(str::to_string)
                .ok_or_else(|| NorthboundError::backend(format!("bad heading {heading}"))))
            .collect::<Result<_, _>>()?;
        let data = document.get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| NorthboundError::backend("ovn-nbctl output has no data"))?;

        let mut rows = Vec::with_capacity(data.len());
        for values in data {
            let values = values.as_array()
                .ok_or_else(|| NorthboundError::backend(format!("bad row {values}")))?;
            if values.len() != headings.len() {
                return Err(NorthboundError::backend("row width does not match headings"));
            }
            let mut columns = HashMap::with_capacity(values.len());
            for (heading, value) in headings.iter().zip(values) {
                columns.insert(heading.clone(), OvsdbValue::from_json(value)?);
            }
            rows.push(Row { columns });
        }
        Ok(rows)
    }

    fn column(&self, name: &str) -> Result<&OvsdbValue, NorthboundError> {
        self.columns.get(name)
            .ok_or_else(|| NorthboundError::backend(format!("row has no column {name}")))
    }

    fn bad_column(name: &str, value: &OvsdbValue) -> NorthboundError {
        NorthboundError::backend(format!("unexpected value {value:?} in column {name}"))
    }

    pub fn uuid(&self, name: &str) -> Result<String, NorthboundError> {
        match self.column(name)? {
            OvsdbValue::Uuid(uuid) => Ok(uuid.clone()),
            other => Err(Self::bad_column(name, other)),
        }
    }

    pub fn string(&self, name: &str) -> Result<String, NorthboundError> {
        let value = self.column(name)?;
        match value.optional_atom() {
            Ok(Some(OvsdbValue::String(text))) => Ok(text.clone()),
            _ => Err(Self::bad_column(name, value)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, NorthboundError> {
        self.optional_integer(name)?
            .ok_or_else(|| NorthboundError::backend(format!("column {name} is empty")))
    }

    /// Missing columns read as empty for every optional accessor, `find` only prints the columns
    /// that were asked for.
    pub fn optional_string(&self, name: &str) -> Result<Option<String>, NorthboundError> {
        self.optional(name, |atom| match atom {
            OvsdbValue::String(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn optional_uuid(&self, name: &str) -> Result<Option<String>, NorthboundError> {
        self.optional(name, |atom| match atom {
            OvsdbValue::Uuid(uuid) => Some(uuid.clone()),
            _ => None,
        })
    }

    pub fn optional_integer(&self, name: &str) -> Result<Option<i64>, NorthboundError> {
        self.optional(name, |atom| match atom {
            OvsdbValue::Integer(number) => Some(*number),
            _ => None,
        })
    }

    pub fn optional_boolean(&self, name: &str) -> Result<Option<bool>, NorthboundError> {
        self.optional(name, |atom| match atom {
            OvsdbValue::Boolean(flag) => Some(*flag),
            _ => None,
        })
    }

    fn optional<T>(
        &self,
        name: &str,
        convert: impl Fn(&OvsdbValue) -> Option<T>,
    ) -> Result<Option<T>, NorthboundError> {
        let Some(value) = self.columns.get(name) else {
            return Ok(None);
        };
        match value.optional_atom() {
            Ok(None) => Ok(None),
            Ok(Some(atom)) => convert(atom).map(Some).ok_or_else(|| Self::bad_column(name, value)),
            Err(()) => Err(Self::bad_column(name, value)),
        }
    }

    /// A set column of strings or uuids.
    pub fn strings(&self, name: &str) -> Result<Vec<String>, NorthboundError> {
        let Some(value) = self.columns.get(name) else {
            return Ok(Vec::new());
        };
        let items = match value {
            OvsdbValue::Set(items) => items.iter().collect::<Vec<_>>(),
            OvsdbValue::Map(_) => return Err(Self::bad_column(name, value)),
            atom => vec![atom],
        };
        items.into_iter()
            .map(|item| item.atom_text().ok_or_else(|| Self::bad_column(name, value)))
            .collect()
    }

    pub fn string_map(&self, name: &str) -> Result<BTreeMap<String, String>, NorthboundError> {
        let Some(value) = self.columns.get(name) else {
            return Ok(BTreeMap::new());
        };
        match value {
            OvsdbValue::Map(entries) => entries.iter()
                .map(|(key, val)| match (key.atom_text(), val.atom_text()) {
                    (Some(key), Some(val)) => Ok((key, val)),
                    _ => Err(Self::bad_column(name, value)),
                })
                .collect(),
            OvsdbValue::Set(items) if items.is_empty() => Ok(BTreeMap::new()),
            other => Err(Self::bad_column(name, other)),
        }
    }
}

/// Conversion between a model and its Northbound table row.
pub trait OvsdbRow: Sized {
    const TABLE: Table;

    /// Every writable column, `_uuid` is not one of them.
    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)>;

    fn from_row(row: &Row) -> Result<Self, NorthboundError>;
}

#[cfg(test)]
mod tests {
    use crate::ovn::components::logical_switch::LogicalSwitch;
    use crate::ovn::components::logical_switch_port::{LogicalSwitchPort, LogicalSwitchPortType};
    use super::*;

    #[test]
    fn test_nbctl_syntax() {
        assert_eq!(OvsdbValue::string("ls-1").to_nbctl(), "\"ls-1\"");
        assert_eq!(OvsdbValue::string("say \"hi\"").to_nbctl(), "\"say \\\"hi\\\"\"");
        assert_eq!(OvsdbValue::strings(&["a".into(), "b".into()]).to_nbctl(), "[\"a\",\"b\"]");
        assert_eq!(OvsdbValue::uuids(&[]).to_nbctl(), "[]");
        assert_eq!(OvsdbValue::optional_integer(Some(100)).to_nbctl(), "[100]");
        let mut map = BTreeMap::new();
        map.insert("limiquantix-sg-id".to_string(), "sg-1".to_string());
        map.insert("a".to_string(), "b".to_string());
        assert_eq!(OvsdbValue::string_map(&map).to_nbctl(), "{\"a\"=\"b\",\"limiquantix-sg-id\"=\"sg-1\"}");
    }

    #[test]
    fn test_parse_switch_rows() {
        let output = r#"{"data":[[["uuid","5a3c3a9e-0000-4000-8000-000000000001"],"ls-net-1",["set",[["uuid","aa"],["uuid","bb"]]],["set",[]],["uuid","cc"],["map",[["limiquantix-network-id","net-1"]]],["map",[]]]],"headings":["_uuid","name","ports","acls","load_balancer","external_ids","other_config"]}"#;
        let rows = Row::from_find_output(output).unwrap();
        assert_eq!(rows.len(), 1);
        let switch = LogicalSwitch::from_row(&rows[0]).unwrap();
        assert_eq!(switch.uuid, "5a3c3a9e-0000-4000-8000-000000000001");
        assert_eq!(switch.name, "ls-net-1");
        assert_eq!(switch.ports, vec!["aa".to_string(), "bb".to_string()]);
        assert!(switch.acls.is_empty());
        assert_eq!(switch.load_balancers, vec!["cc".to_string()]);
        assert_eq!(switch.external_ids["limiquantix-network-id"], "net-1");
    }

    #[test]
    fn test_parse_optional_columns() {
        let output = r#"{"data":[[["uuid","p1"],"lsp-1","localnet",["set",["unknown"]],["set",[]],true,101,["map",[["network_name","physnet"]]],["set",[]]]],"headings":["_uuid","name","type","addresses","port_security","enabled","tag","options","dhcpv4_options"]}"#;
        let rows = Row::from_find_output(output).unwrap();
        let port = LogicalSwitchPort::from_row(&rows[0]).unwrap();
        assert_eq!(port.port_type, LogicalSwitchPortType::Localnet);
        assert_eq!(port.addresses, vec!["unknown".to_string()]);
        assert_eq!(port.enabled, Some(true));
        assert_eq!(port.tag, Some(101));
        assert_eq!(port.options["network_name"], "physnet");
        assert_eq!(port.dhcpv4_options, None);
        assert!(port.external_ids.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Row::from_find_output("").unwrap().is_empty());
        assert!(Row::from_find_output("not json").is_err());
        assert!(Row::from_find_output(r#"{"data":[["a","b"]],"headings":["_uuid"]}"#).is_err());
        let rows = Row::from_find_output(r#"{"data":[["ls-1"]],"headings":["name"]}"#).unwrap();
        assert!(rows[0].uuid("_uuid").is_err());
        assert!(rows[0].integer("name").is_err());
    }
}
