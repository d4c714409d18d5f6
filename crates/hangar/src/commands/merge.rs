use crate::errors::CliError;
use camino::Utf8PathBuf;
use colored::Colorize;
use hangar_merge::json::{parse_game_json_file, to_indented_string};
use hangar_merge::{is_advanced_merge, merge_into_target, AdvancedMerge};
use miette::{IntoDiagnostic, Result};
use serde_json::Value;

pub struct MergeArgs {
    pub base: String,
    pub kind: Option<String>,
    pub id: Option<String>,
    pub output: Option<String>,
    pub contributions: Vec<String>,
}

pub fn merge_documents(args: MergeArgs) -> Result<()> {
    let base = existing_file(&args.base)?;
    let mut target = parse_game_json_file(&base).map_err(CliError::from)?;

    for contribution_path in &args.contributions {
        let path = existing_file(contribution_path)?;
        let contribution = parse_game_json_file(&path).map_err(CliError::from)?;
        if !targets_resource(&contribution, args.kind.as_deref(), args.id.as_deref())? {
            eprintln!(
                "{} {} {}",
                "•".bright_yellow(),
                path,
                "(targets another resource, skipped)".dimmed()
            );
            continue;
        }
        tracing::info!("Merging {}", path);
        merge_into_target(&mut target, contribution).map_err(CliError::from)?;
    }

    let merged = to_indented_string(&target).map_err(CliError::from)?;
    match args.output {
        Some(output) => {
            let output = Utf8PathBuf::from(output);
            if let Some(parent) = output.parent().filter(|p| !p.as_str().is_empty()) {
                std::fs::create_dir_all(parent).into_diagnostic()?;
            }
            std::fs::write(&output, merged).into_diagnostic()?;
            eprintln!("{} {}", "✓ Merged into".bright_green().bold(), output.as_str().bright_cyan());
        }
        None => println!("{merged}"),
    }
    Ok(())
}

fn existing_file(path: &str) -> Result<Utf8PathBuf> {
    let path = Utf8PathBuf::from(path);
    if !path.is_file() {
        return Err(CliError::file_not_found(path).into());
    }
    Ok(path)
}

/// Whether an advanced merge applies to the resource named by `kind` and `id`.
///
/// Plain contributions always apply, as do advanced ones when no id was given.
fn targets_resource(contribution: &Value, kind: Option<&str>, id: Option<&str>) -> Result<bool> {
    if !is_advanced_merge(contribution) {
        return Ok(true);
    }
    let Some(id) = id else {
        return Ok(true);
    };
    let merge = AdvancedMerge::from_value(contribution.clone()).map_err(CliError::from)?;
    let type_matches = match (kind, merge.target_type.as_deref()) {
        (Some(kind), Some(target_type)) => kind == target_type,
        _ => true,
    };
    Ok(type_matches && merge.targets().contains(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_contribution_always_applies() {
        assert!(targets_resource(&json!({"a": 1}), Some("MechDef"), Some("x")).unwrap());
    }

    #[test]
    fn test_advanced_contribution_filters_by_id_and_type() {
        let merge = json!({
            "TargetIDs": ["mech_def_1"],
            "TargetType": "MechDef",
            "Instructions": []
        });
        assert!(targets_resource(&merge, None, None).unwrap());
        assert!(targets_resource(&merge, None, Some("mech_def_1")).unwrap());
        assert!(targets_resource(&merge, Some("MechDef"), Some("mech_def_1")).unwrap());
        assert!(!targets_resource(&merge, Some("ChassisDef"), Some("mech_def_1")).unwrap());
        assert!(!targets_resource(&merge, None, Some("mech_def_2")).unwrap());
    }

    #[test]
    fn test_merge_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let base = root.join("base.json");
        let patch = root.join("patch.json");
        let output = root.join("out/merged.json");
        std::fs::write(&base, r#"{"Cost": 1, "Tags": ["a"]}"#).unwrap();
        std::fs::write(
            &patch,
            r#"{"TargetID": "m", "Instructions": [{"Action": "ArrayAdd", "JSONPath": "$.Tags", "Value": "b"}]}"#,
        )
        .unwrap();

        merge_documents(MergeArgs {
            base: base.to_string(),
            kind: None,
            id: Some("m".to_string()),
            output: Some(output.to_string()),
            contributions: vec![patch.to_string()],
        })
        .unwrap();

        let merged: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(merged, json!({"Cost": 1, "Tags": ["a", "b"]}));
    }

    #[test]
    fn test_missing_base_is_reported() {
        let result = merge_documents(MergeArgs {
            base: "does/not/exist.json".to_string(),
            kind: None,
            id: None,
            output: None,
            contributions: vec![],
        });
        assert!(result.is_err());
    }
}
