//! Per-project isolation: deterministic namespace and port derivation, plus
//! registry and lifecycle for side-by-side service instances.
//!
//! The same absolute project path always derives the same id, port, and
//! namespace — in one process and across restarts. Two different projects
//! hashing to the same port is surfaced as a conflict at registration time;
//! the mapping is never silently re-probed.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::StorePaths;
use crate::error::{Error, Result};
use crate::models::{ProjectRegistration, ProjectStatus};

const PORT_RANGE_START: u16 = 8000;
const PORT_RANGE_SIZE: u16 = 1000;
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Stable project id: final path segment plus a truncated digest of the
/// whole absolute path, so sibling checkouts with the same directory name
/// stay distinct.
pub fn derive_project_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let short = hex::encode(&digest[..4]);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    format!("{}_{}", name, short)
}

/// Map a project id into the 8000-8999 port range. Same id, same port,
/// always.
pub fn derive_port(project_id: &str) -> u16 {
    let digest = Sha256::digest(project_id.as_bytes());
    let n = u16::from_be_bytes([digest[0], digest[1]]);
    PORT_RANGE_START + (n % PORT_RANGE_SIZE)
}

pub fn derive_namespace(kind: &str, project_id: &str) -> String {
    format!("{}_{}", kind, project_id)
}

/// Whether something is listening on the port at localhost.
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}

#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// An instance was already listening; starting is idempotent.
    AlreadyRunning,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// No PID marker: nothing to signal, and that is not an error.
    NotRunning,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    projects: BTreeMap<String, ProjectRegistration>,
    last_updated: Option<String>,
}

/// Registry of project registrations, persisted so registrations survive
/// process restarts. The hub exclusively owns these records; service
/// instances only ever read their own.
pub struct ProjectHub {
    registry_path: PathBuf,
    projects: BTreeMap<String, ProjectRegistration>,
}

impl ProjectHub {
    pub fn open(registry_path: PathBuf) -> Result<Self> {
        let projects = if registry_path.exists() {
            let raw = std::fs::read_to_string(&registry_path)?;
            serde_json::from_str::<RegistryFile>(&raw)?.projects
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            registry_path,
            projects,
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(crate::config::default_data_dir()?.join("projects.json"))
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.registry_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = RegistryFile {
            projects: self.projects.clone(),
            last_updated: Some(Utc::now().to_rfc3339()),
        };
        std::fs::write(&self.registry_path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Register a project path under a name. Re-registering the same path is
    /// idempotent and returns the existing record; a different project whose
    /// derived port collides with an already-registered one is a conflict
    /// the operator has to resolve.
    pub fn register_project(
        &mut self,
        path: &Path,
        name: Option<String>,
        kind: &str,
    ) -> Result<ProjectRegistration> {
        let path = std::path::absolute(path)?;
        let name = name.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        });

        if let Some(existing) = self.projects.get(&name) {
            if Path::new(&existing.path) == path {
                return Ok(existing.clone());
            }
            return Err(Error::Conflict(format!(
                "project name {} is already registered for {}",
                name, existing.path
            )));
        }

        let project_id = derive_project_id(&path);
        let port = derive_port(&project_id);

        if let Some(clash) = self
            .projects
            .values()
            .find(|p| p.port == port && Path::new(&p.path) != path)
        {
            return Err(Error::Conflict(format!(
                "derived port {} collides with project {} ({})",
                port, clash.name, clash.path
            )));
        }

        let registration = ProjectRegistration {
            name: name.clone(),
            path: path.to_string_lossy().into_owned(),
            kind: kind.to_string(),
            port,
            namespace: derive_namespace(kind, &project_id),
            status: ProjectStatus::Inactive,
            last_active: None,
        };

        self.projects.insert(name, registration.clone());
        self.save()?;
        tracing::info!(
            "registered project {} on port {}",
            registration.name,
            registration.port
        );
        Ok(registration)
    }

    pub fn get_project(&self, name: &str) -> Option<&ProjectRegistration> {
        self.projects.get(name)
    }

    /// All registrations with liveness refreshed from the port probe.
    pub fn list_projects(&mut self) -> Result<Vec<ProjectRegistration>> {
        self.refresh_status()?;
        Ok(self.projects.values().cloned().collect())
    }

    fn refresh_status(&mut self) -> Result<()> {
        let mut changed = false;
        for project in self.projects.values_mut() {
            let live = is_port_in_use(project.port);
            let status = if live {
                ProjectStatus::Active
            } else {
                ProjectStatus::Inactive
            };
            if project.status != status {
                project.status = status;
                if live {
                    project.last_active = Some(Utc::now());
                }
                changed = true;
            }
        }
        if changed {
            self.save()?;
        }
        Ok(())
    }

    /// Start the project's service instance. Idempotent: an instance already
    /// listening on the derived port reports success rather than erroring.
    pub fn start_project(&mut self, name: &str) -> Result<StartOutcome> {
        let project = self
            .projects
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("project {} is not registered", name)))?
            .clone();

        if !Path::new(&project.path).exists() {
            return Err(Error::Validation(format!(
                "project path {} does not exist",
                project.path
            )));
        }

        if is_port_in_use(project.port) {
            self.mark_active(name)?;
            return Ok(StartOutcome::AlreadyRunning);
        }

        let exe = std::env::current_exe()?;
        std::process::Command::new(exe)
            .arg("serve")
            .arg("--dir")
            .arg(&project.path)
            .arg("--port")
            .arg(project.port.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        self.mark_active(name)?;
        tracing::info!("started project {} on port {}", name, project.port);
        Ok(StartOutcome::Started)
    }

    fn mark_active(&mut self, name: &str) -> Result<()> {
        if let Some(project) = self.projects.get_mut(name) {
            project.status = ProjectStatus::Active;
            project.last_active = Some(Utc::now());
        }
        self.save()
    }

    /// Stop the project's instance via its PID marker. A missing marker
    /// means nothing is running, which is a success, not an error.
    pub fn stop_project(&mut self, name: &str) -> Result<StopOutcome> {
        let project = self
            .projects
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("project {} is not registered", name)))?
            .clone();

        let outcome = stop_instance(&StorePaths::at(&project.path))?;

        if let Some(project) = self.projects.get_mut(name) {
            project.status = ProjectStatus::Inactive;
        }
        self.save()?;
        Ok(outcome)
    }
}

/// Signal the instance owning a store via its PID marker. Absence of the
/// marker means "not running".
pub fn stop_instance(paths: &StorePaths) -> Result<StopOutcome> {
    match paths.read_pid() {
        Some(pid) => {
            let delivered = signal_stop(pid);
            // The recorded process may already be gone; either way the
            // marker no longer points at a live instance
            paths.remove_pid()?;
            Ok(if delivered {
                StopOutcome::Stopped
            } else {
                StopOutcome::NotRunning
            })
        }
        None => Ok(StopOutcome::NotRunning),
    }
}

#[cfg(unix)]
fn signal_stop(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn signal_stop(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_is_deterministic_and_path_sensitive() {
        let a = derive_project_id(Path::new("/home/u/app"));
        let b = derive_project_id(Path::new("/home/u/app"));
        let c = derive_project_id(Path::new("/srv/other/app"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("app_"));
        assert_eq!(a.len(), "app_".len() + 8);
    }

    #[test]
    fn derived_ports_stay_in_range_and_repeat() {
        for path in ["/home/u/app", "/tmp/x", "/var/lib/service"] {
            let id = derive_project_id(Path::new(path));
            let port = derive_port(&id);
            assert!((8000..9000).contains(&port), "port {} out of range", port);
            assert_eq!(port, derive_port(&id));
        }
    }

    #[test]
    fn namespace_combines_kind_and_id() {
        let ns = derive_namespace("app", "web_0a1b2c3d");
        assert_eq!(ns, "app_web_0a1b2c3d");
    }

    #[test]
    fn registry_survives_reload() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = tmp.path().join("projects.json");
        let project_dir = tmp.path().join("demo");
        std::fs::create_dir_all(&project_dir).unwrap();

        let registered = {
            let mut hub = ProjectHub::open(registry.clone()).unwrap();
            hub.register_project(&project_dir, None, "app").unwrap()
        };

        let hub = ProjectHub::open(registry).unwrap();
        let reloaded = hub.get_project(&registered.name).unwrap();
        assert_eq!(reloaded.port, registered.port);
        assert_eq!(reloaded.namespace, registered.namespace);
    }

    #[test]
    fn reregistering_the_same_path_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = tmp.path().join("projects.json");
        let project_dir = tmp.path().join("demo");
        std::fs::create_dir_all(&project_dir).unwrap();

        let mut hub = ProjectHub::open(registry).unwrap();
        let first = hub.register_project(&project_dir, None, "app").unwrap();
        let second = hub.register_project(&project_dir, None, "app").unwrap();
        assert_eq!(first.port, second.port);
        assert_eq!(hub.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn name_collision_on_different_paths_is_a_conflict() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = tmp.path().join("projects.json");
        let dir_a = tmp.path().join("a");
        let dir_b = tmp.path().join("b");
        std::fs::create_dir_all(&dir_a).unwrap();
        std::fs::create_dir_all(&dir_b).unwrap();

        let mut hub = ProjectHub::open(registry).unwrap();
        hub.register_project(&dir_a, Some("shared".into()), "app")
            .unwrap();
        let err = hub
            .register_project(&dir_b, Some("shared".into()), "app")
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn stopping_an_unstarted_project_reports_not_running() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = tmp.path().join("projects.json");
        let project_dir = tmp.path().join("demo");
        std::fs::create_dir_all(&project_dir).unwrap();

        let mut hub = ProjectHub::open(registry).unwrap();
        hub.register_project(&project_dir, None, "app").unwrap();
        let name = hub.list_projects().unwrap()[0].name.clone();
        assert_eq!(hub.stop_project(&name).unwrap(), StopOutcome::NotRunning);
    }
}
