//! Integration binaries and the generated agent integration config.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use nri_e2e_common::spec::Integration;
use serde::Serialize;

/// Document written to `integrations.d/nri-config.yml`.
#[derive(Debug, Serialize, PartialEq)]
pub struct IntegrationList<'a> {
    pub integrations: Vec<IntegrationConfig<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct IntegrationConfig<'a> {
    pub name: &'a str,
    pub config: &'a BTreeMap<String, serde_yaml_ng::Value>,
    pub env: &'a BTreeMap<String, serde_yaml_ng::Value>,
}

impl<'a> IntegrationList<'a> {
    pub fn new(integrations: &'a [Integration]) -> Self {
        Self {
            integrations: integrations
                .iter()
                .map(|integration| IntegrationConfig {
                    name: &integration.name,
                    config: &integration.config,
                    env: &integration.env,
                })
                .collect(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(self)
    }
}

/// Copy a regular file, keeping its permissions.
pub fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", source.display()),
        ));
    }
    // fs::copy also carries the permission bits over.
    fs::copy(source, destination)?;
    fs::set_permissions(destination, metadata.permissions())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integration_list_yaml() {
        let integrations: Vec<Integration> = serde_yaml_ng::from_str(
            r#"
- name: nri-redis
  binary_path: bin/nri-redis
  config:
    hostname: localhost
    port: 6379
  env:
    METRICS: "true"
- name: nri-prometheus
"#,
        )
        .expect("parse integrations");

        let yaml = IntegrationList::new(&integrations).to_yaml().expect("render");
        let rendered: serde_yaml_ng::Value = serde_yaml_ng::from_str(&yaml).expect("reparse");

        let first = &rendered["integrations"][0];
        assert_eq!(first["name"].as_str(), Some("nri-redis"));
        assert_eq!(first["config"]["port"].as_u64(), Some(6379));
        assert_eq!(first["env"]["METRICS"].as_str(), Some("true"));
        assert!(!yaml.contains("binary_path"));
        assert_eq!(
            rendered["integrations"][1]["name"].as_str(),
            Some("nri-prometheus")
        );
    }

    #[test]
    fn test_copy_file_keeps_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("nri-redis");
        let destination = dir.path().join("copy");
        fs::write(&source, b"#!/bin/sh\necho ok\n").expect("write");

        copy_file(&source, &destination).expect("copy");
        assert_eq!(fs::read(&destination).expect("read"), b"#!/bin/sh\necho ok\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_file_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("exporter");
        let destination = dir.path().join("copy");
        fs::write(&source, b"bin").expect("write");
        fs::set_permissions(&source, fs::Permissions::from_mode(0o750)).expect("chmod");

        copy_file(&source, &destination).expect("copy");
        let mode = fs::metadata(&destination).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = copy_file(dir.path(), &dir.path().join("copy")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("is not a regular file"));
    }
}
