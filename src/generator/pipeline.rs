use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::output::ManifestStream;
use crate::config::GenerateConfig;
use crate::convert::convert_workload;
use crate::document::{apply_path_override, merge_override, parse_override_property};
use crate::project::{
    load_state, persist_state, prime_resources, project_dir, state_file_path, State,
};
use crate::provisioners::{
    load_provisioners_from_directory, provision_resources, ProvisionContext, DEFAULT_SUFFIX,
};
use crate::workload::{apply_upgrade_transforms, decode_workload, validate_workload, Workload};

/// Counts from a successful `generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateReport {
    pub workloads: usize,
    pub resources: usize,
    pub manifests: usize,
}

/// Run `score-k8s generate`.
///
/// Each stage must succeed before the next starts:
///
/// 1. load the project state
/// 2. read, override, upgrade, validate and merge every workload file
/// 3. prime resources
/// 4. provision everything not yet provisioned
/// 5. persist the state
/// 6. assemble the manifest stream, refusing any unresolved secret reference
/// 7. emit the stream
///
/// Nothing is written to the output before stage 7, and the state is only
/// rewritten once provisioning has fully succeeded. A cancelled `cancel`
/// token fails the run before the state or the output is written.
pub async fn generate(
    config: &GenerateConfig,
    cancel: CancellationToken,
) -> anyhow::Result<GenerateReport> {
    let root = config.project_root.as_path();
    if !project_dir(root).is_dir() {
        bail!("state directory does not exist, please run \"score-k8s init\" first");
    }
    let state_path = state_file_path(root);
    let mut state = load_state(&state_path)?;

    for file in &config.files {
        let workload = read_workload(config, file)?;
        state
            .add_workload(workload, Some(file.clone()))
            .with_context(|| format!("failed to add score file to project: {}", file.display()))?;
        info!(file = %file.display(), "added score file to project");
    }

    if state.workloads.is_empty() {
        bail!("project is empty, please add a score file");
    }

    prime_resources(&mut state).context("failed to prime resources")?;
    info!(
        workloads = state.workloads.len(),
        resources = state.resources.len(),
        "primed resources"
    );

    let provisioners = load_provisioners_from_directory(&project_dir(root), DEFAULT_SUFFIX)
        .context("failed to load provisioners")?;
    let ctx = ProvisionContext::new(cancel.clone(), config.runtime.provisioner_timeout);
    provision_resources(&mut state, &provisioners, &ctx)
        .await
        .context("failed to provision resources")?;

    ensure_not_cancelled(&cancel, "persisting state")?;
    persist_state(&state_path, &state)?;

    let stream = assemble(&state, root)?;
    ensure_not_cancelled(&cancel, "writing manifests")?;
    stream.emit(&config.output, root)?;

    Ok(GenerateReport {
        workloads: state.workloads.len(),
        resources: state.resources.len(),
        manifests: stream.len(),
    })
}

fn ensure_not_cancelled(cancel: &CancellationToken, stage: &str) -> anyhow::Result<()> {
    if cancel.is_cancelled() {
        bail!("generate cancelled before {stage}");
    }
    Ok(())
}

/// Resource manifests first, then each workload's converted manifests.
fn assemble(state: &State, root: &Path) -> anyhow::Result<ManifestStream> {
    let mut stream = ManifestStream::new();
    for (uid, manifests) in &state.extras.manifests {
        for manifest in manifests {
            stream
                .push(manifest)
                .with_context(|| format!("resource '{uid}'"))?;
        }
    }
    info!(count = stream.len(), "wrote resource manifests to manifests buffer");

    for name in state.workloads.keys() {
        let manifests = convert_workload(state, name, root)
            .with_context(|| format!("workload: {name}: failed to convert"))?;
        for manifest in &manifests {
            stream
                .push(manifest)
                .with_context(|| format!("workload: {name}"))?;
        }
        info!(workload = %name, count = manifests.len(), "wrote manifests to manifests buffer");
    }
    Ok(stream)
}

/// Read one workload file and bring it into typed form.
fn read_workload(config: &GenerateConfig, file: &Path) -> anyhow::Result<Workload> {
    let path = config.resolve(file);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read input score file: {}", file.display()))?;
    let mut doc: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to decode input score file: {}", file.display()))?;

    if let Some(overrides) = &config.overrides_file {
        apply_overrides_file(&config.resolve(overrides), &mut doc)
            .with_context(|| format!("--overrides-file '{}'", overrides.display()))?;
    }

    for entry in &config.override_properties {
        let (parts, op) = parse_override_property(entry)
            .with_context(|| format!("--override-property '{entry}' is invalid"))?;
        info!(path = %parts.join("."), "overriding property in workload");
        apply_path_override(&mut doc, &parts, op)
            .with_context(|| format!("--override-property '{entry}' could not be applied"))?;
    }

    let changes = apply_upgrade_transforms(&mut doc)
        .with_context(|| format!("failed to upgrade spec: {}", file.display()))?;
    for change in changes {
        info!("applying backwards compatible upgrade {change}");
    }

    validate_workload(&doc).with_context(|| format!("invalid score file: {}", file.display()))?;
    let mut workload = decode_workload(doc)
        .with_context(|| format!("failed to decode input score file: {}", file.display()))?;

    for (name, container) in workload.containers.iter_mut() {
        if container.image != "." {
            continue;
        }
        match &config.image {
            Some(image) => {
                info!(container = %name, image = %image, "set container image from --image");
                container.image = image.clone();
            }
            None => warn!(container = %name, "container image is '.' and no --image was given"),
        }
    }
    Ok(workload)
}

fn apply_overrides_file(path: &Path, doc: &mut Value) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read file '{}'", path.display()))?;
    let patch: Value = serde_yaml::from_str(&raw).context("failed to decode yaml")?;
    if !patch.is_object() && !patch.is_null() {
        bail!("overrides must be a mapping");
    }
    info!(file = %path.display(), "applying overrides to workload");
    merge_override(doc, patch);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerateArgs, InitConfig, OutputTarget, RuntimeConfig};
    use crate::generator::init_project;
    use crate::project::ProvisionStatus;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        init_project(&InitConfig {
            project_root: dir.path().to_path_buf(),
        })
        .unwrap();
        dir
    }

    fn config(dir: &TempDir, files: &[&str], properties: &[&str]) -> GenerateConfig {
        GenerateConfig::new(
            dir.path(),
            GenerateArgs {
                files: files.iter().map(Into::into).collect(),
                override_properties: properties.iter().map(|s| s.to_string()).collect(),
                output: "manifests.yaml".into(),
                ..Default::default()
            },
            RuntimeConfig::default(),
        )
        .unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn state(dir: &TempDir) -> State {
        load_state(&state_file_path(dir.path())).unwrap()
    }

    const WORKLOAD: &str = "apiVersion: score.dev/v1b1\nmetadata:\n  name: NAME\ncontainers:\n  main:\n    image: nginx\n";

    #[tokio::test]
    async fn test_generate_example_project() {
        let dir = project();
        let report = generate(&config(&dir, &["score.yaml"], &[]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.workloads, 1);
        let out = fs::read_to_string(dir.path().join("manifests.yaml")).unwrap();
        assert!(out.starts_with("---\n"));
        assert!(out.contains("kind: Deployment"));
        assert!(out.contains("stefanprodan/podinfo"));
    }

    #[tokio::test]
    async fn test_workloads_merge_in_sorted_order() {
        let dir = project();
        write(&dir, "a.score.yaml", &WORKLOAD.replace("NAME", "alpha"));
        write(&dir, "b.score.yaml", &WORKLOAD.replace("NAME", "beta"));
        generate(
            &config(&dir, &["b.score.yaml", "a.score.yaml"], &[]),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let names: Vec<String> = state(&dir).workloads.keys().cloned().collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_override_property_delete_and_set() {
        let dir = project();
        write(
            &dir,
            "w.yaml",
            "apiVersion: score.dev/v1b1\nmetadata:\n  name: web\n  foo:\n    bar: 1\n    baz: 2\ncontainers:\n  main:\n    image: nginx\n",
        );
        generate(
            &config(&dir, &["w.yaml"], &["metadata.foo.bar=", "metadata.foo.baz=5"]),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let foo = state(&dir).workloads["web"].spec.metadata["foo"].clone();
        assert_eq!(foo, serde_json::json!({"baz": 5}));
    }

    #[tokio::test]
    async fn test_image_placeholder_replaced() {
        let dir = project();
        write(&dir, "w.yaml", &WORKLOAD.replace("NAME", "web").replace("nginx", "."));
        let mut cfg = config(&dir, &["w.yaml"], &[]);
        cfg.image = Some("registry.local/app:1".into());
        cfg.output = OutputTarget::File("out.yaml".into());
        generate(&cfg, CancellationToken::new()).await.unwrap();
        let out = fs::read_to_string(dir.path().join("out.yaml")).unwrap();
        assert!(out.contains("image: registry.local/app:1"), "{out}");
    }

    #[tokio::test]
    async fn test_empty_project_fails() {
        let dir = project();
        let err = generate(&config(&dir, &[], &[]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("project is empty"));
        assert!(!dir.path().join("manifests.yaml").exists());
    }

    #[tokio::test]
    async fn test_invalid_workload_names_file() {
        let dir = project();
        write(&dir, "bad.yaml", "apiVersion: score.dev/v1b1\nmetadata: {}\ncontainers: {}\n");
        let err = generate(&config(&dir, &["bad.yaml"], &[]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("bad.yaml"));
    }

    #[tokio::test]
    async fn test_default_volume_provisioner_is_used() {
        let dir = project();
        write(
            &dir,
            "w.yaml",
            "apiVersion: score.dev/v1b1\nmetadata:\n  name: web\ncontainers:\n  main:\n    image: nginx\n    volumes:\n      /data:\n        source: ${resources.data}\nresources:\n  data:\n    type: volume\n",
        );
        generate(&config(&dir, &["w.yaml"], &[]), CancellationToken::new())
            .await
            .unwrap();
        let saved = state(&dir);
        let record = saved.resources.values().next().unwrap();
        assert_eq!(record.status, ProvisionStatus::Provisioned);
        assert_eq!(
            record.provisioner.as_deref(),
            Some("template://default-provisioners/volume")
        );
        let out = fs::read_to_string(dir.path().join("manifests.yaml")).unwrap();
        assert!(out.contains("emptyDir: {}"), "{out}");
    }

    #[tokio::test]
    async fn test_unsupported_resource_leaves_state_untouched() {
        let dir = project();
        let before = fs::read(state_file_path(dir.path())).unwrap();
        write(
            &dir,
            "w.yaml",
            "apiVersion: score.dev/v1b1\nmetadata:\n  name: web\ncontainers:\n  main:\n    image: nginx\nresources:\n  q:\n    type: rabbitmq\n",
        );
        let err = generate(&config(&dir, &["w.yaml"], &[]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("rabbitmq.default#web.q"), "{err:#}");
        assert_eq!(fs::read(state_file_path(dir.path())).unwrap(), before);
        assert!(!dir.path().join("manifests.yaml").exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let dir = project();
        let before = fs::read(state_file_path(dir.path())).unwrap();
        write(
            &dir,
            "w.yaml",
            "apiVersion: score.dev/v1b1\nmetadata:\n  name: web\ncontainers:\n  main:\n    image: nginx\nresources:\n  data:\n    type: volume\n",
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = generate(&config(&dir, &["w.yaml"], &[]), cancel)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("cancelled"), "{err:#}");
        assert_eq!(fs::read(state_file_path(dir.path())).unwrap(), before);
        assert!(!dir.path().join("manifests.yaml").exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_without_resources_writes_nothing() {
        let dir = project();
        let before = fs::read(state_file_path(dir.path())).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = generate(&config(&dir, &["score.yaml"], &[]), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled before persisting state"), "{err}");
        assert_eq!(fs::read(state_file_path(dir.path())).unwrap(), before);
        assert!(!dir.path().join("manifests.yaml").exists());
    }
}
