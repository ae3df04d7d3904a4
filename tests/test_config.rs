mod common;

use common::*;
use std::io::Write;
use volumescan::ScanError;

#[test]
fn test_config_file_overrides_selected_values() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{ "model_version": "1.1.0", "admission": {{ "min_sharpness": 20.0 }} }}"#
    )?;

    let config = ScanConfig::from_json_file(file.path())?;
    assert_eq!(config.model_version, "1.1.0");
    assert_eq!(config.admission.min_sharpness, 20.0);
    assert_eq!(config.admission.min_dimension, 640);
    assert_eq!(config.reference.tracing.grid_stride, 10);
    Ok(())
}

#[test]
fn test_model_identity_comes_from_config() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{ "model_version": "2.0.0-rc1" }}"#)?;
    let scanner = VolumeScanner::new(ScanConfig::from_json_file(file.path())?);

    let result = scanner.run(&RawImageInput::from_bytes(vec![0u8; 4]));
    assert_eq!(result.failure().unwrap().model_version, "2.0.0-rc1");
    Ok(())
}

#[test]
fn test_malformed_config_reports_path() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "{{ not json")?;
    let err = ScanConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, ScanError::ConfigParse { .. }));
    assert!(err.to_string().contains(&file.path().display().to_string()));
    Ok(())
}

#[test]
fn test_invalid_values_are_rejected() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, r#"{{ "max_concurrent_scans": 0 }}"#)?;
    let err = ScanConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, ScanError::InvalidConfig(_)));
    Ok(())
}
