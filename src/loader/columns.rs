//! Column role resolution: label, weight, group and ignored columns.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::config::{LoadConfig, NO_SPECIFIC};
use crate::error::LoadError;

/// Resolved column roles.
///
/// `weight_idx`, `group_idx` and `ignore_features` are in
/// post-label-removal coordinates: original column `c` becomes `c - 1`
/// when `c > label_idx`. Weight and group columns are automatically part
/// of `ignore_features`.
#[derive(Debug)]
pub(crate) struct ColumnRoles {
    pub label_idx: usize,
    pub weight_idx: i32,
    pub group_idx: i32,
    pub ignore_features: HashSet<usize>,
    /// Header names with the label removed; empty when there is no header.
    pub feature_names: Vec<String>,
}

/// Resolve the configured role specs against the (optional) header line.
pub(crate) fn resolve(config: &LoadConfig, header: Option<&str>) -> Result<ColumnRoles, LoadError> {
    let mut feature_names: Vec<String> = header
        .map(|line| {
            line.split(['\t', ','])
                .map(|s| s.trim().to_string())
                .collect()
        })
        .unwrap_or_default();
    let name2idx: HashMap<&str, usize> = feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let label_idx = if config.label_column.is_empty() {
        0
    } else {
        resolve_one("label", &config.label_column, &name2idx)?
    };

    let mut ignore_features = HashSet::new();
    if !config.ignore_column.is_empty() {
        if let Some(names) = config.ignore_column.strip_prefix("name:") {
            for name in names.split(',') {
                let idx = *name2idx
                    .get(name)
                    .ok_or_else(|| LoadError::UnknownColumnName {
                        role: "ignore",
                        name: name.to_string(),
                    })?;
                ignore_features.insert(shift_past_label(idx, label_idx));
            }
        } else {
            for token in config.ignore_column.split(',') {
                let idx: usize = token
                    .trim()
                    .parse()
                    .map_err(|_| LoadError::ColumnNotNumber { role: "ignore" })?;
                ignore_features.insert(shift_past_label(idx, label_idx));
            }
        }
    }

    let mut weight_idx = NO_SPECIFIC;
    if !config.weight_column.is_empty() {
        let idx = resolve_one("weight", &config.weight_column, &name2idx)?;
        let idx = shift_past_label(idx, label_idx);
        weight_idx = idx as i32;
        ignore_features.insert(idx);
    }

    let mut group_idx = NO_SPECIFIC;
    if !config.group_column.is_empty() {
        let idx = resolve_one("group", &config.group_column, &name2idx)?;
        let idx = shift_past_label(idx, label_idx);
        group_idx = idx as i32;
        ignore_features.insert(idx);
    }

    if !feature_names.is_empty() && label_idx < feature_names.len() {
        feature_names.remove(label_idx);
    }

    Ok(ColumnRoles {
        label_idx,
        weight_idx,
        group_idx,
        ignore_features,
        feature_names,
    })
}

fn resolve_one(
    role: &'static str,
    spec: &str,
    name2idx: &HashMap<&str, usize>,
) -> Result<usize, LoadError> {
    if let Some(name) = spec.strip_prefix("name:") {
        let idx = *name2idx
            .get(name)
            .ok_or_else(|| LoadError::UnknownColumnName {
                role,
                name: name.to_string(),
            })?;
        info!("using column {name} as {role}");
        Ok(idx)
    } else {
        let idx: usize = spec
            .parse()
            .map_err(|_| LoadError::ColumnNotNumber { role })?;
        info!("using column number {idx} as {role}");
        Ok(idx)
    }
}

#[inline]
fn shift_past_label(column: usize, label_idx: usize) -> usize {
    if column > label_idx {
        column - 1
    } else {
        column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_label_is_column_zero() {
        let config = LoadConfig::default();
        let roles = resolve(&config, None).unwrap();
        assert_eq!(roles.label_idx, 0);
        assert_eq!(roles.weight_idx, NO_SPECIFIC);
        assert_eq!(roles.group_idx, NO_SPECIFIC);
        assert!(roles.ignore_features.is_empty());
        assert!(roles.feature_names.is_empty());
    }

    #[test]
    fn test_label_by_name_removed_from_names() {
        let config = LoadConfig::builder()
            .has_header(true)
            .label_column("name:label")
            .build();
        let roles = resolve(&config, Some("a,b,c,label")).unwrap();
        assert_eq!(roles.label_idx, 3);
        assert_eq!(roles.feature_names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_roles_shift_past_label() {
        // Header id,x,y,label,w with label at 3: w (4) shifts to 3,
        // id (0) stays 0.
        let config = LoadConfig::builder()
            .has_header(true)
            .label_column("name:label")
            .weight_column("name:w")
            .ignore_column("name:id")
            .build();
        let roles = resolve(&config, Some("id,x,y,label,w")).unwrap();

        assert_eq!(roles.label_idx, 3);
        assert_eq!(roles.feature_names, vec!["id", "x", "y", "w"]);
        assert_eq!(roles.weight_idx, 3);
        assert_eq!(
            roles.ignore_features,
            HashSet::from([0usize, 3usize])
        );
    }

    #[test]
    fn test_group_is_auto_ignored() {
        let config = LoadConfig::builder()
            .label_column("0")
            .group_column("2")
            .build();
        let roles = resolve(&config, None).unwrap();
        assert_eq!(roles.group_idx, 1);
        assert!(roles.ignore_features.contains(&1));
    }

    #[test]
    fn test_ignore_list_by_index() {
        let config = LoadConfig::builder()
            .label_column("1")
            .ignore_column("0,2,3")
            .build();
        let roles = resolve(&config, None).unwrap();
        // 0 stays, 2 and 3 shift past the label at 1.
        assert_eq!(roles.ignore_features, HashSet::from([0usize, 1, 2]));
    }

    #[test]
    fn test_unknown_name_is_fatal() {
        let config = LoadConfig::builder()
            .has_header(true)
            .label_column("name:missing")
            .build();
        let err = resolve(&config, Some("a,b")).unwrap_err();
        assert!(matches!(err, LoadError::UnknownColumnName { role: "label", .. }));
    }

    #[test]
    fn test_non_number_without_prefix_is_fatal() {
        let config = LoadConfig::builder().weight_column("w").build();
        let err = resolve(&config, None).unwrap_err();
        assert!(matches!(err, LoadError::ColumnNotNumber { role: "weight" }));
    }

    #[test]
    fn test_tab_separated_header() {
        let config = LoadConfig::builder()
            .has_header(true)
            .label_column("name:y")
            .build();
        let roles = resolve(&config, Some("y\tf0\tf1")).unwrap();
        assert_eq!(roles.label_idx, 0);
        assert_eq!(roles.feature_names, vec!["f0", "f1"]);
    }
}
