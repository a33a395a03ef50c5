use std::fs;
use std::path::Path;

use mdm_upload_core::asset::resolve_asset;
use mdm_upload_core::config::AttachPolicy;
use mdm_upload_core::contract::{CustomApp, MockTransport, SignedUploadTarget, StorageReceipt};
use mdm_upload_core::release::{
    prepare, publish, verify_conditions, PublishOutcome, ReleaseEnv, ReleaseSettings,
};
use mdm_upload_core::Error;
use tempfile::{tempdir, TempDir};

struct TestCase {
    name: &'static str,
    files: Vec<&'static str>,
    expected: Result<&'static str, usize>,
}

fn dist_with(files: &[&str]) -> TempDir {
    let dir = tempdir().unwrap();
    for file in files {
        fs::write(dir.path().join(file), b"artifact").unwrap();
    }
    dir
}

fn template_in(dir: &Path) -> String {
    format!("{}/Agent-${{version}}-*.pkg", dir.display())
}

#[test]
fn asset_resolution_table_driven() {
    let cases = vec![
        TestCase {
            name: "exactly one match",
            files: vec!["Agent-2.0.0-universal.pkg", "Agent-1.9.0-universal.pkg"],
            expected: Ok("Agent-2.0.0-universal.pkg"),
        },
        TestCase {
            name: "no match",
            files: vec!["Agent-1.9.0-universal.pkg"],
            expected: Err(0),
        },
        TestCase {
            name: "several matches",
            files: vec!["Agent-2.0.0-arm64.pkg", "Agent-2.0.0-x86_64.pkg"],
            expected: Err(2),
        },
    ];

    for case in cases {
        let dir = dist_with(&case.files);
        let result = resolve_asset(&template_in(dir.path()), "2.0.0");
        match (result, case.expected) {
            (Ok(path), Ok(file)) => assert_eq!(path, dir.path().join(file), "{}", case.name),
            (Err(Error::AssetResolution { matches, .. }), Err(count)) => {
                assert_eq!(matches.len(), count, "{}", case.name)
            }
            (other, expected) => panic!("{}: got {other:?}, expected {expected:?}", case.name),
        }
    }
}

fn settings(asset_path: String, release: bool, pre_release: bool) -> ReleaseSettings {
    ReleaseSettings {
        app_id: Some("app-123".into()),
        asset_path: Some(asset_path),
        release,
        pre_release,
        postinstall_script: vec!["#!/bin/sh".into(), "echo installed".into()],
    }
}

fn env() -> ReleaseEnv {
    ReleaseEnv {
        api_url: Some("https://tenant.example.com".into()),
        api_token: Some("token".into()),
    }
}

#[test]
fn prepare_resolves_the_versioned_asset() {
    let dir = dist_with(&["Agent-3.1.0-universal.pkg"]);
    let verified = verify_conditions(&settings(template_in(dir.path()), true, false), &env())
        .expect("settings complete");
    let asset = prepare(&verified, "3.1.0").unwrap();
    assert_eq!(asset, dir.path().join("Agent-3.1.0-universal.pkg"));
}

#[tokio::test]
async fn disabled_branch_is_a_no_op_without_network() {
    let dir = dist_with(&["Agent-1.0.0-universal.pkg"]);
    let cases = [
        // (release, pre_release, branch_is_prerelease)
        (false, false, false),
        (false, true, false),
        (true, false, true),
        (false, false, true),
    ];
    for (release, pre_release, branch_is_prerelease) in cases {
        // No expectations: any transport call panics.
        let transport = MockTransport::new();
        let verified = verify_conditions(
            &settings(template_in(dir.path()), release, pre_release),
            &env(),
        )
        .unwrap();
        let outcome = publish(
            &transport,
            &AttachPolicy::default(),
            &verified,
            "1.0.0",
            branch_is_prerelease,
        )
        .await
        .unwrap();
        assert_eq!(outcome, PublishOutcome::Skipped);
    }
}

#[tokio::test]
async fn ambiguous_asset_fails_before_network() {
    let dir = dist_with(&["Agent-1.0.0-arm64.pkg", "Agent-1.0.0-x86_64.pkg"]);
    let transport = MockTransport::new();
    let verified = verify_conditions(&settings(template_in(dir.path()), true, false), &env())
        .unwrap();

    let err = publish(&transport, &AttachPolicy::default(), &verified, "1.0.0", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AssetResolution { .. }), "got {err:?}");
}

#[tokio::test]
async fn prerelease_branch_publishes_when_enabled() {
    let dir = dist_with(&["Agent-2.0.0-beta.1-universal.pkg"]);
    let asset = dir.path().join("Agent-2.0.0-beta.1-universal.pkg");
    let verified = verify_conditions(&settings(template_in(dir.path()), false, true), &env())
        .unwrap();

    let mut transport = MockTransport::new();
    transport
        .expect_request_upload_target()
        .withf(|filename| filename == "Agent-2.0.0-beta.1-universal.pkg")
        .times(1)
        .returning(|_| {
            Ok(SignedUploadTarget {
                post_url: "https://s3/x".into(),
                file_key: "k9".into(),
                post_data: Default::default(),
            })
        });
    transport
        .expect_push_to_storage()
        .withf(move |path, _| path == asset.as_path())
        .times(1)
        .returning(|_, _| {
            Ok(StorageReceipt {
                status: 204,
                body: String::new(),
            })
        });
    transport
        .expect_patch_app()
        .withf(|_, patch| patch.file_key.as_deref() == Some("k9"))
        .times(1)
        .returning(|id, patch| {
            Ok(CustomApp {
                id: id.to_string(),
                name: None,
                version: None,
                description: None,
                platform: None,
                file_key: patch.file_key.clone(),
                postinstall_script: None,
                created_at: None,
                updated_at: None,
            })
        });
    transport
        .expect_patch_app()
        .withf(|_, patch| {
            patch.postinstall_script.as_deref() == Some("#!/bin/sh\necho installed")
        })
        .times(1)
        .returning(|id, patch| {
            Ok(CustomApp {
                id: id.to_string(),
                name: None,
                version: None,
                description: None,
                platform: None,
                file_key: Some("k9".into()),
                postinstall_script: patch.postinstall_script.clone(),
                created_at: None,
                updated_at: None,
            })
        });

    let outcome = publish(
        &transport,
        &AttachPolicy::default(),
        &verified,
        "2.0.0-beta.1",
        true,
    )
    .await
    .unwrap();

    match outcome {
        PublishOutcome::Published(app) => {
            assert_eq!(app.id, "app-123");
            assert_eq!(app.file_key.as_deref(), Some("k9"));
            assert!(app.postinstall_script.is_some());
        }
        PublishOutcome::Skipped => panic!("expected the release to publish"),
    }
}
