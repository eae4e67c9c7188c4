//! Tests for resource request validation and sbatch flag generation

use rstest::rstest;
use rstudio_manager::client::hpc::{HpcPartition, HpcProfile, ResourceRange, lms::lms_profile};
use rstudio_manager::client::resource_request::{
    ResourceField, ResourceRequest, ValidationError, hours_to_walltime,
};
use std::path::Path;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[rstest]
fn test_default_int_request_yields_all_flags() {
    let request = ResourceRequest::validate(&lms_profile(), "int", 1, 8, 0, 16).unwrap();
    assert_eq!(
        request.resource_args(),
        args(&[
            "--partition=int",
            "--cpus-per-task=1",
            "--mem=8G",
            "--gres=gpu:0",
            "--time=16:00:00",
        ])
    );
}

#[rstest]
fn test_cpu_out_of_range() {
    let err = ResourceRequest::validate(&lms_profile(), "int", 999, 8, 0, 16).unwrap_err();
    assert_eq!(
        err,
        ValidationError::OutOfRange {
            partition: "int".to_string(),
            field: ResourceField::Cpu,
            requested: 999,
            allowed: ResourceRange::new(1, 32),
        }
    );
    let message = err.to_string();
    assert!(message.contains("cpu"));
    assert!(message.contains("999"));
    assert!(message.contains("[1,32]"));
}

#[rstest]
fn test_unknown_partition() {
    let err = ResourceRequest::validate(&lms_profile(), "debug", 1, 8, 0, 16).unwrap_err();
    match err {
        ValidationError::UnknownPartition {
            partition,
            available,
        } => {
            assert_eq!(partition, "debug");
            assert!(available.contains(&"int".to_string()));
            assert!(available.contains(&"gpu".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[case("int", 32, 256, 2, 24, None)]
#[case("int", 1, 1, 0, 1, None)]
#[case("int", 0, 8, 0, 16, Some(ResourceField::Cpu))]
#[case("int", 1, 257, 0, 16, Some(ResourceField::Memory))]
#[case("int", 1, 8, 3, 16, Some(ResourceField::Gpu))]
#[case("int", 1, 8, 0, 25, Some(ResourceField::Walltime))]
#[case("int", 1, 8, 0, 0, Some(ResourceField::Walltime))]
#[case("cpu", 1, 8, 1, 16, Some(ResourceField::Gpu))]
#[case("gpu", 8, 64, 0, 16, Some(ResourceField::Gpu))]
#[case("gpu", 8, 64, 4, 72, None)]
fn test_bounds(
    #[case] partition: &str,
    #[case] cpus: u32,
    #[case] mem: u32,
    #[case] gpus: u32,
    #[case] hours: u32,
    #[case] failing_field: Option<ResourceField>,
) {
    let result = ResourceRequest::validate(&lms_profile(), partition, cpus, mem, gpus, hours);
    match (result, failing_field) {
        (Ok(_), None) => {}
        (Err(ValidationError::OutOfRange { field, .. }), Some(expected)) => {
            assert_eq!(field, expected)
        }
        (result, expected) => panic!("got {result:?}, expected failure on {expected:?}"),
    }
}

#[rstest]
fn test_first_violation_wins() {
    let err = ResourceRequest::validate(&lms_profile(), "int", 1, 999, 9, 99).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::OutOfRange {
            field: ResourceField::Memory,
            ..
        }
    ));
}

#[rstest]
fn test_overridden_partition_limits() {
    let profile = lms_profile().with_overrides(&[HpcPartition {
        name: "int".to_string(),
        description: String::new(),
        cpus: ResourceRange::new(1, 4),
        memory_gb: ResourceRange::new(1, 16),
        gpus: ResourceRange::new(0, 0),
        walltime_hours: ResourceRange::new(1, 8),
    }]);
    assert!(ResourceRequest::validate(&profile, "int", 4, 16, 0, 8).is_ok());
    assert!(ResourceRequest::validate(&profile, "int", 8, 16, 0, 8).is_err());
    // Other partitions keep their built-in limits
    assert!(ResourceRequest::validate(&profile, "cpu", 64, 500, 0, 168).is_ok());
}

#[rstest]
fn test_submission_args_include_output_name_and_tag() {
    let request = ResourceRequest::validate(&lms_profile(), "cpu", 4, 32, 0, 48).unwrap();
    let submitted = request.submission_args(
        "analysis",
        Path::new("/home/me/.rstudio_manager/rstudio_x1.log"),
        "rstudio_manager",
    );
    assert_eq!(
        submitted,
        args(&[
            "--partition=cpu",
            "--cpus-per-task=4",
            "--mem=32G",
            "--gres=gpu:0",
            "--time=2-00:00:00",
            "--output=/home/me/.rstudio_manager/rstudio_x1.log",
            "--job-name=analysis",
            "--comment=rstudio_manager",
        ])
    );
}

#[rstest]
#[case("int", 1, 8, 0, 16)]
#[case("gpu", 16, 128, 2, 72)]
#[case("hmem", 96, 3000, 0, 168)]
fn test_from_submission_args_recovers_request(
    #[case] partition: &str,
    #[case] cpus: u32,
    #[case] mem: u32,
    #[case] gpus: u32,
    #[case] hours: u32,
) {
    let request =
        ResourceRequest::validate(&lms_profile(), partition, cpus, mem, gpus, hours).unwrap();
    let submitted = request.submission_args("job", Path::new("/tmp/job.log"), "tag");
    assert_eq!(
        ResourceRequest::from_submission_args(&submitted),
        Some(request)
    );
}

#[rstest]
fn test_from_submission_args_rejects_incomplete() {
    assert!(ResourceRequest::from_submission_args(&args(&["--partition=int"])).is_none());
    assert!(
        ResourceRequest::from_submission_args(&args(&[
            "--partition=int",
            "--cpus-per-task=1",
            "--mem=8",
            "--gres=gpu:0",
            "--time=16:00:00",
        ]))
        .is_none()
    );
}

#[rstest]
#[case(1, "01:00:00")]
#[case(16, "16:00:00")]
#[case(24, "1-00:00:00")]
#[case(36, "1-12:00:00")]
#[case(168, "7-00:00:00")]
fn test_hours_to_walltime(#[case] hours: u32, #[case] expected: &str) {
    assert_eq!(hours_to_walltime(hours), expected);
}

#[rstest]
fn test_profile_lookup() {
    let profile: HpcProfile = lms_profile();
    assert_eq!(profile.partition_names(), vec!["int", "cpu", "gpu", "hmem"]);
    assert!(profile.get_partition("hmem").is_some());
}
