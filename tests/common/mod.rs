#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// A scratch project directory driven through the built binary.
pub struct Project {
    dir: TempDir,
}

impl Project {
    /// Empty directory, not yet initialised.
    pub fn empty() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Directory after a successful `score-k8s init`.
    pub fn initialised() -> Self {
        let project = Self::empty();
        let out = project.run(&["init"]);
        assert!(out.status.success(), "init failed: {}", stderr(&out));
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.path().join(".score-k8s")
    }

    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_score-k8s"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .env_remove("SCORE_K8S_PROVISIONER_TIMEOUT")
            .args(args)
            .output()
            .expect("run score-k8s")
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).unwrap()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path().join(name).exists()
    }

    /// Install a `cmd://` provisioner for `resource_type` that runs `script`
    /// through `/bin/sh`.
    ///
    /// The script receives `provision` as its first argument and the JSON
    /// input on stdin, which it should write to `$INPUT` if the test wants to
    /// inspect it. Whatever it prints on stdout is the provisioner's output.
    pub fn stub_provisioner(&self, resource_type: &str, script: &str) {
        let script_path = self.state_dir().join(format!("{resource_type}.sh"));
        let input_path = self.state_dir().join(format!("{resource_type}.input.json"));
        fs::write(
            &script_path,
            format!("INPUT='{}'\n{script}", input_path.display()),
        )
        .unwrap();
        let descriptor = format!(
            "- uri: cmd:///bin/sh\n  type: {resource_type}\n  args: ['{}', '<mode>']\n",
            script_path.display()
        );
        fs::write(
            self.state_dir()
                .join(format!("10-{resource_type}.provisioners.yaml")),
            descriptor,
        )
        .unwrap();
    }

    /// Raw JSON input the stub for `resource_type` last received.
    pub fn stub_input(&self, resource_type: &str) -> serde_json::Value {
        let raw = fs::read_to_string(
            self.state_dir()
                .join(format!("{resource_type}.input.json")),
        )
        .unwrap();
        serde_json::from_str(&raw).unwrap()
    }
}

pub fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Minimal workload named `name` with a single nginx container.
pub fn workload(name: &str) -> String {
    format!(
        "apiVersion: score.dev/v1b1\nmetadata:\n  name: {name}\ncontainers:\n  main:\n    image: nginx\n"
    )
}

/// Split a manifest stream into its documents.
pub fn documents(stream: &str) -> Vec<serde_json::Value> {
    stream
        .split("---\n")
        .filter(|doc| !doc.trim().is_empty())
        .map(|doc| serde_yaml::from_str(doc).unwrap())
        .collect()
}
