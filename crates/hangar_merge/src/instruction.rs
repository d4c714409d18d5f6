//! Merge instructions: one action applied to every node a JSONPath selects.

use crate::error::{kind_name, Error, Result};
use crate::json::merge_replace_arrays;
use crate::path::{select_segments, JsonPath, Location, Segment, Selector, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MergeAction {
    ArrayAdd,
    ArrayAddAfter,
    ArrayAddBefore,
    ArrayConcat,
    ObjectMerge,
    Remove,
    Replace,
    /// An action name this loader does not know. Applying it is an error.
    Unknown(String),
}

impl MergeAction {
    pub fn as_str(&self) -> &str {
        match self {
            MergeAction::ArrayAdd => "ArrayAdd",
            MergeAction::ArrayAddAfter => "ArrayAddAfter",
            MergeAction::ArrayAddBefore => "ArrayAddBefore",
            MergeAction::ArrayConcat => "ArrayConcat",
            MergeAction::ObjectMerge => "ObjectMerge",
            MergeAction::Remove => "Remove",
            MergeAction::Replace => "Replace",
            MergeAction::Unknown(name) => name,
        }
    }

    /// Value created for a missing property when auto-create is on.
    fn auto_create_default(&self) -> Option<Value> {
        match self {
            MergeAction::ArrayAdd | MergeAction::ArrayConcat => Some(Value::Array(Vec::new())),
            MergeAction::Replace | MergeAction::ObjectMerge => Some(Value::Object(Default::default())),
            _ => None,
        }
    }
}

impl From<String> for MergeAction {
    fn from(name: String) -> Self {
        match name.as_str() {
            "ArrayAdd" => MergeAction::ArrayAdd,
            "ArrayAddAfter" => MergeAction::ArrayAddAfter,
            "ArrayAddBefore" => MergeAction::ArrayAddBefore,
            "ArrayConcat" => MergeAction::ArrayConcat,
            "ObjectMerge" => MergeAction::ObjectMerge,
            "Remove" => MergeAction::Remove,
            "Replace" => MergeAction::Replace,
            _ => MergeAction::Unknown(name),
        }
    }
}

impl From<MergeAction> for String {
    fn from(action: MergeAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for MergeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single edit of an advanced merge document.
///
/// ```json
/// { "Action": "ArrayAdd", "JSONPath": "$.weapons", "Value": { "id": "laser1" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instruction {
    #[serde(alias = "action")]
    pub action: MergeAction,

    #[serde(rename = "JSONPath", alias = "JsonPath", alias = "jsonPath")]
    pub json_path: String,

    #[serde(default, alias = "value")]
    pub value: Value,

    /// Create the last path property when it is missing.
    #[serde(default, alias = "autoCreateProperty")]
    pub auto_create_property: bool,
}

impl Instruction {
    pub fn new(action: MergeAction, json_path: impl Into<String>, value: Value) -> Self {
        Self {
            action,
            json_path: json_path.into(),
            value,
            auto_create_property: false,
        }
    }

    pub fn with_auto_create(mut self) -> Self {
        self.auto_create_property = true;
        self
    }

    /// Applies the instruction to `root`.
    ///
    /// Returns `Ok(false)` when the path selected nothing. Nodes are edited
    /// deepest and last first, so sibling inserts and removals never shift a
    /// location that is still to be visited.
    pub fn process(&self, root: &mut Value) -> Result<bool> {
        let path = JsonPath::parse(&self.json_path)?;
        let mut locations = if self.auto_create_property {
            self.select_or_create(&path, root)?
        } else {
            path.select(root)
        };
        if locations.is_empty() {
            return Ok(false);
        }

        locations.sort();
        locations.dedup();
        for location in locations.iter().rev() {
            self.apply_at(root, location)?;
        }
        Ok(true)
    }

    fn apply_at(&self, root: &mut Value, location: &Location) -> Result<()> {
        match &self.action {
            MergeAction::Remove => {
                let (parent, step) = location
                    .split_last()
                    .ok_or_else(|| self.error("cannot remove the document root"))?;
                match (parent.get_mut(root), step) {
                    (Some(Value::Object(map)), Step::Key(key)) => {
                        map.shift_remove(key);
                    }
                    (Some(Value::Array(items)), Step::Index(index)) if *index < items.len() => {
                        items.remove(*index);
                    }
                    _ => {}
                }
            }
            MergeAction::Replace => {
                if location.is_root() {
                    return Err(self.error("cannot replace the document root"));
                }
                if let Some(node) = location.get_mut(root) {
                    *node = self.value.clone();
                }
            }
            MergeAction::ArrayAdd => match location.get_mut(root) {
                Some(Value::Array(items)) => items.push(self.value.clone()),
                Some(other) => {
                    return Err(self.error(format!("JSONPath needs to point to an array, found {}", kind_name(other))))
                }
                None => {}
            },
            MergeAction::ArrayAddAfter | MergeAction::ArrayAddBefore => {
                let (parent, step) = location
                    .split_last()
                    .ok_or_else(|| self.error("cannot add a sibling to the document root"))?;
                match (parent.get_mut(root), step) {
                    (Some(Value::Array(items)), Step::Index(index)) => {
                        let at = if self.action == MergeAction::ArrayAddAfter {
                            index + 1
                        } else {
                            *index
                        };
                        items.insert(at.min(items.len()), self.value.clone());
                    }
                    (Some(_), _) => {
                        return Err(self.error("JSONPath needs to point to an array element"));
                    }
                    (None, _) => {}
                }
            }
            MergeAction::ObjectMerge => {
                let Some(node) = location.get_mut(root) else {
                    return Ok(());
                };
                if !node.is_object() || !self.value.is_object() {
                    return Err(self.error("JSONPath has to point to an object and Value has to be an object"));
                }
                merge_replace_arrays(node, self.value.clone());
            }
            MergeAction::ArrayConcat => {
                let Some(node) = location.get_mut(root) else {
                    return Ok(());
                };
                match (node, &self.value) {
                    (Value::Array(items), Value::Array(extra)) => items.extend(extra.iter().cloned()),
                    _ => {
                        return Err(self.error("JSONPath has to point to an array and Value has to be an array"));
                    }
                }
            }
            MergeAction::Unknown(name) => {
                return Err(self.error(format!("unhandled action '{name}'")));
            }
        }
        Ok(())
    }

    /// Evaluates all but the last segment, then selects or creates the final
    /// property under each parent.
    fn select_or_create(&self, path: &JsonPath, root: &mut Value) -> Result<Vec<Location>> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(self.error("AutoCreateProperty: JSONPath does not contain a field property expression"));
        };
        let Segment::Child(Selector::Name(name)) = last else {
            return Err(self.error(
                "AutoCreateProperty: JSONPath does not contain a field property expression at the end",
            ));
        };
        let default = self
            .action
            .auto_create_default()
            .ok_or_else(|| self.error("AutoCreateProperty: the merge action is not supported"))?;

        let parent_locations = select_segments(root, parents, vec![Location::root()]);
        let mut locations = Vec::with_capacity(parent_locations.len());
        for parent in parent_locations {
            let Some(node) = parent.get_mut(root) else {
                continue;
            };
            let Value::Object(map) = node else {
                return Err(self.error(
                    "AutoCreateProperty: the container is not an object and does not accept properties",
                ));
            };
            if !map.contains_key(name) {
                map.insert(name.clone(), default.clone());
            }
            locations.push(parent.child(Step::Key(name.clone())));
        }
        Ok(locations)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Instruction {
            action: self.action.to_string(),
            path: self.json_path.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(doc: Value, instruction: Instruction) -> (Value, bool) {
        let mut doc = doc;
        let applied = instruction.process(&mut doc).unwrap();
        (doc, applied)
    }

    #[test]
    fn test_deserialize_instruction() {
        let instruction: Instruction = serde_json::from_value(json!({
            "Action": "ArrayAdd",
            "JSONPath": "$.weapons",
            "Value": {"id": "laser1"},
            "AutoCreateProperty": true
        }))
        .unwrap();
        assert_eq!(instruction.action, MergeAction::ArrayAdd);
        assert_eq!(instruction.json_path, "$.weapons");
        assert!(instruction.auto_create_property);

        let unknown: Instruction =
            serde_json::from_value(json!({"Action": "Explode", "JSONPath": "$"})).unwrap();
        assert_eq!(unknown.action, MergeAction::Unknown("Explode".to_string()));
        assert_eq!(unknown.value, Value::Null);
    }

    #[test]
    fn test_array_add_appends() {
        let (doc, applied) = run(
            json!({"weapons": [{"id": "ac20"}]}),
            Instruction::new(MergeAction::ArrayAdd, "$.weapons", json!({"id": "laser1"})),
        );
        assert!(applied);
        assert_eq!(doc, json!({"weapons": [{"id": "ac20"}, {"id": "laser1"}]}));
    }

    #[test]
    fn test_array_add_appends_array_as_one_element() {
        let (doc, _) = run(
            json!({"a": [1]}),
            Instruction::new(MergeAction::ArrayAdd, "$.a", json!([2, 3])),
        );
        assert_eq!(doc, json!({"a": [1, [2, 3]]}));
    }

    #[test]
    fn test_array_add_on_object_fails() {
        let mut doc = json!({"a": {}});
        let err = Instruction::new(MergeAction::ArrayAdd, "$.a", json!(1))
            .process(&mut doc)
            .unwrap_err();
        assert!(matches!(err, Error::Instruction { .. }));
    }

    #[test]
    fn test_array_add_after_and_before() {
        let (doc, _) = run(
            json!({"a": [1, 2, 3]}),
            Instruction::new(MergeAction::ArrayAddAfter, "$.a[-1:]", json!(4)),
        );
        assert_eq!(doc, json!({"a": [1, 2, 3, 4]}));

        let (doc, _) = run(
            json!({"a": [1, 2, 3]}),
            Instruction::new(MergeAction::ArrayAddBefore, "$.a[-2:-1:]", json!("x")),
        );
        assert_eq!(doc, json!({"a": [1, "x", 2, 3]}));

        let (doc, _) = run(
            json!({"a": [1, 2]}),
            Instruction::new(MergeAction::ArrayAddAfter, "$.a[*]", json!(0)),
        );
        assert_eq!(doc, json!({"a": [1, 0, 2, 0]}));
    }

    #[test]
    fn test_array_add_after_property_value_fails() {
        let mut doc = json!({"a": 1});
        assert!(Instruction::new(MergeAction::ArrayAddAfter, "$.a", json!(2))
            .process(&mut doc)
            .is_err());
    }

    #[test]
    fn test_remove_property_and_elements() {
        let (doc, _) = run(
            json!({"a": 1, "b": 2}),
            Instruction::new(MergeAction::Remove, "$.a", Value::Null),
        );
        assert_eq!(doc, json!({"b": 2}));

        let (doc, _) = run(
            json!({"items": [{"id": "x"}, {"id": "y"}, {"id": "x"}]}),
            Instruction::new(MergeAction::Remove, "$.items[?(@.id == 'x')]", Value::Null),
        );
        assert_eq!(doc, json!({"items": [{"id": "y"}]}));
    }

    #[test]
    fn test_replace() {
        let (doc, _) = run(
            json!({"Description": {"Cost": 100}}),
            Instruction::new(MergeAction::Replace, "$.Description.Cost", json!(250)),
        );
        assert_eq!(doc, json!({"Description": {"Cost": 250}}));
    }

    #[test]
    fn test_object_merge_replaces_arrays() {
        let (doc, _) = run(
            json!({"d": {"a": [1, 2], "b": 1}}),
            Instruction::new(MergeAction::ObjectMerge, "$.d", json!({"a": [3], "c": 2})),
        );
        assert_eq!(doc, json!({"d": {"a": [3], "b": 1, "c": 2}}));
    }

    #[test]
    fn test_object_merge_on_root() {
        let (doc, _) = run(
            json!({"a": 1}),
            Instruction::new(MergeAction::ObjectMerge, "$", json!({"b": 2})),
        );
        assert_eq!(doc, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_object_merge_requires_objects() {
        let mut doc = json!({"a": [1]});
        assert!(Instruction::new(MergeAction::ObjectMerge, "$.a", json!({}))
            .process(&mut doc)
            .is_err());
        let mut doc = json!({"a": {}});
        assert!(Instruction::new(MergeAction::ObjectMerge, "$.a", json!([1]))
            .process(&mut doc)
            .is_err());
    }

    #[test]
    fn test_array_concat() {
        let (doc, _) = run(
            json!({"a": [1, 2]}),
            Instruction::new(MergeAction::ArrayConcat, "$.a", json!([3, 4])),
        );
        assert_eq!(doc, json!({"a": [1, 2, 3, 4]}));

        let mut doc = json!({"a": [1]});
        assert!(Instruction::new(MergeAction::ArrayConcat, "$.a", json!(3))
            .process(&mut doc)
            .is_err());
    }

    #[test]
    fn test_unknown_action_fails() {
        let mut doc = json!({"a": 1});
        let err = Instruction::new(MergeAction::Unknown("Explode".into()), "$.a", Value::Null)
            .process(&mut doc)
            .unwrap_err();
        assert!(err.to_string().contains("Explode"));
    }

    #[test]
    fn test_zero_matches_is_not_an_error() {
        let (doc, applied) = run(
            json!({"a": 1}),
            Instruction::new(MergeAction::Replace, "$.missing", json!(2)),
        );
        assert!(!applied);
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_auto_create_missing_array() {
        let (doc, applied) = run(
            json!({"Custom": {}}),
            Instruction::new(MergeAction::ArrayAdd, "$.Custom.Tags", json!("new")).with_auto_create(),
        );
        assert!(applied);
        assert_eq!(doc, json!({"Custom": {"Tags": ["new"]}}));
    }

    #[test]
    fn test_auto_create_uses_existing_property() {
        let (doc, _) = run(
            json!({"Tags": ["a"]}),
            Instruction::new(MergeAction::ArrayConcat, "$.Tags", json!(["b"])).with_auto_create(),
        );
        assert_eq!(doc, json!({"Tags": ["a", "b"]}));
    }

    #[test]
    fn test_auto_create_object_for_merge_and_replace() {
        let (doc, _) = run(
            json!({}),
            Instruction::new(MergeAction::ObjectMerge, "$.Stats", json!({"Armor": 5})).with_auto_create(),
        );
        assert_eq!(doc, json!({"Stats": {"Armor": 5}}));

        let (doc, _) = run(
            json!({}),
            Instruction::new(MergeAction::Replace, "$.Name", json!("Atlas")).with_auto_create(),
        );
        assert_eq!(doc, json!({"Name": "Atlas"}));
    }

    #[test]
    fn test_auto_create_requires_trailing_field() {
        let mut doc = json!({"a": [1]});
        assert!(Instruction::new(MergeAction::ArrayAdd, "$.a[0]", json!(1))
            .with_auto_create()
            .process(&mut doc)
            .is_err());
        assert!(Instruction::new(MergeAction::ArrayAdd, "$", json!(1))
            .with_auto_create()
            .process(&mut doc)
            .is_err());
    }

    #[test]
    fn test_auto_create_rejects_unsupported_action() {
        let mut doc = json!({});
        assert!(Instruction::new(MergeAction::Remove, "$.a", Value::Null)
            .with_auto_create()
            .process(&mut doc)
            .is_err());
    }

    #[test]
    fn test_auto_create_needs_object_container() {
        let mut doc = json!({"a": [1, 2]});
        let err = Instruction::new(MergeAction::ArrayAdd, "$.a.b", json!(1))
            .with_auto_create()
            .process(&mut doc)
            .unwrap_err();
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn test_auto_create_does_not_create_intermediate_segments() {
        let (doc, applied) = run(
            json!({}),
            Instruction::new(MergeAction::ArrayAdd, "$.missing.Tags", json!(1)).with_auto_create(),
        );
        assert!(!applied);
        assert_eq!(doc, json!({}));
    }
}
