// ABOUTME: In-memory fakes for every workflow collaborator, used by unit tests.
// ABOUTME: FakeRuntime keeps containers, networks and volumes in maps and records execs.

use crate::config::Settings;
use crate::database::{ClientError, DatabaseClient, DbError, Probe, ProbeLauncher};
use crate::diagnostics::Diagnostics;
use crate::hosts::HostsFile;
use crate::manifest::Templates;
use crate::record::{RecordError, RecordStore, SiteRecord, SqliteRecordStore};
use crate::runtime::sealed::Sealed;
use crate::runtime::{
    COMPOSE_PROJECT_LABEL, ComposeError, ComposeOps, ComposeProject, ContainerConfig,
    ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult, ImageError, ImageOps,
    NetworkConfig, NetworkError, NetworkOps, RuntimeInfo, RuntimeInfoError, RuntimeMetadata,
    VolumeConfig, VolumeError, VolumeOps, VolumeSummary,
};
use crate::site::{Platform, ServiceKind, SiteParams, SiteRequest, validate};
use crate::status::{StatusError, StatusProbe};
use crate::tls::{CertificateIssuer, TlsError};
use crate::types::{ContainerId, ImageRef, NetworkId, SiteUrl, VolumeId};
use crate::workflow::{CancelToken, Collaborators, Provisioner};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Validate a request for `url` against default settings and an empty store.
pub(crate) fn site_params(url: &str, f: impl FnOnce(&mut SiteRequest)) -> SiteParams {
    params_with(Settings::default(), url, f)
}

/// Like [`site_params`], with sites rooted under `dir/sites`.
pub(crate) fn site_params_in(dir: &Path, url: &str, f: impl FnOnce(&mut SiteRequest)) -> SiteParams {
    let settings = Settings {
        sites_root: dir.join("sites"),
        ..Settings::default()
    };
    params_with(settings, url, f)
}

fn params_with(settings: Settings, url: &str, f: impl FnOnce(&mut SiteRequest)) -> SiteParams {
    let mut request = SiteRequest {
        url: url.to_string(),
        ..Default::default()
    };
    f(&mut request);
    let store = SqliteRecordStore::in_memory().unwrap();
    validate(&request, &settings, &store, &mut Diagnostics::default()).unwrap()
}

fn ok_exec() -> ExecResult {
    ExecResult {
        exit_code: 0,
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

type ExecResponder = Arc<dyn Fn(&str, &ExecConfig) -> ExecResult + Send + Sync>;
type InspectHook = Arc<dyn Fn(&mut ContainerInfo) + Send + Sync>;

#[derive(Default)]
struct NetworkState {
    connected: BTreeSet<String>,
}

#[derive(Default)]
struct RuntimeState {
    containers: BTreeMap<String, ContainerInfo>,
    networks: BTreeMap<String, NetworkState>,
    volumes: BTreeMap<String, VolumeSummary>,
    images: BTreeSet<String>,
    pulled: Vec<String>,
    execs: Vec<(String, ExecConfig)>,
    failing: HashSet<String>,
}

/// A container runtime that lives in memory.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    state: Mutex<RuntimeState>,
    volume_root: Option<PathBuf>,
    responder: Mutex<Option<ExecResponder>>,
    inspect_hook: Mutex<Option<InspectHook>>,
}

impl FakeRuntime {
    /// Volumes get a real mountpoint directory under `volume_root`.
    pub(crate) fn new(volume_root: PathBuf) -> Self {
        Self {
            volume_root: Some(volume_root),
            ..Default::default()
        }
    }

    /// Make every later call of `op` (a trait method name) fail.
    pub(crate) fn fail_on(&self, op: &str) {
        self.state.lock().failing.insert(op.to_string());
    }

    fn injected(&self, op: &str) -> Option<String> {
        self.state
            .lock()
            .failing
            .contains(op)
            .then(|| format!("injected failure in {op}"))
    }

    pub(crate) fn respond_to_exec(
        &self,
        f: impl Fn(&str, &ExecConfig) -> ExecResult + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Some(Arc::new(f));
    }

    /// Answer `mysql` execs in `container` from `db`; other execs succeed.
    pub(crate) fn serve_mysql(&self, container: &str, db: FakeDatabase) {
        let container = container.to_string();
        self.respond_to_exec(move |target, config| {
            if target == container {
                db.answer(config)
            } else {
                ok_exec()
            }
        });
    }

    pub(crate) fn set_inspect_hook(&self, f: impl Fn(&mut ContainerInfo) + Send + Sync + 'static) {
        *self.inspect_hook.lock() = Some(Arc::new(f));
    }

    pub(crate) fn add_container(&self, name: &str, labels: HashMap<String, String>) {
        let info = ContainerInfo {
            id: ContainerId::new(name),
            name: name.to_string(),
            image: "fake".to_string(),
            state: ContainerState::Running,
            labels,
            networks: HashMap::new(),
        };
        self.state.lock().containers.insert(name.to_string(), info);
    }

    pub(crate) fn add_network(&self, name: &str) {
        self.state
            .lock()
            .networks
            .insert(name.to_string(), NetworkState::default());
    }

    pub(crate) fn container(&self, name: &str) -> Option<ContainerInfo> {
        self.state.lock().containers.get(name).cloned()
    }

    pub(crate) fn container_names(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub(crate) fn network_names(&self) -> Vec<String> {
        self.state.lock().networks.keys().cloned().collect()
    }

    pub(crate) fn connected(&self, network: &str) -> Vec<String> {
        self.state
            .lock()
            .networks
            .get(network)
            .map(|n| n.connected.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn volume_names(&self) -> Vec<String> {
        self.state.lock().volumes.keys().cloned().collect()
    }

    pub(crate) fn execs(&self) -> Vec<(String, ExecConfig)> {
        self.state.lock().execs.clone()
    }

    pub(crate) fn pulled(&self) -> Vec<String> {
        self.state.lock().pulled.clone()
    }
}

impl Sealed for FakeRuntime {}

fn labels_match(have: &HashMap<String, String>, want: &HashMap<String, String>) -> bool {
    want.iter().all(|(k, v)| have.get(k) == Some(v))
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        if let Some(msg) = self.injected("create_container") {
            return Err(ContainerError::Runtime(msg));
        }
        let mut state = self.state.lock();
        if state.containers.contains_key(&config.name) {
            return Err(ContainerError::AlreadyExists(config.name.clone()));
        }
        let id = ContainerId::new(config.name.as_str());
        state.containers.insert(
            config.name.clone(),
            ContainerInfo {
                id: id.clone(),
                name: config.name.clone(),
                image: config.image.to_string(),
                state: ContainerState::Created,
                labels: config.labels.clone(),
                networks: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        if let Some(msg) = self.injected("start_container") {
            return Err(ContainerError::Runtime(msg));
        }
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        if let Some(msg) = self.injected("remove_container") {
            return Err(ContainerError::Runtime(msg));
        }
        let mut state = self.state.lock();
        state
            .containers
            .remove(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        for network in state.networks.values_mut() {
            network.connected.remove(id.as_str());
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let mut info = self
            .container(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if let Some(hook) = self.inspect_hook.lock().clone() {
            hook(&mut info);
        }
        Ok(info)
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        if let Some(msg) = self.injected("list_containers") {
            return Err(ContainerError::Runtime(msg));
        }
        let state = self.state.lock();
        Ok(state
            .containers
            .values()
            .filter(|c| labels_match(&c.labels, &filters.labels))
            .filter(|c| filters.all || c.state == ContainerState::Running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: format!("{:?}", c.state).to_lowercase(),
                labels: c.labels.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl NetworkOps for FakeRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        if let Some(msg) = self.injected("create_network") {
            return Err(NetworkError::Runtime(msg));
        }
        let mut state = self.state.lock();
        if state.networks.contains_key(&config.name) {
            return Err(NetworkError::AlreadyExists(config.name.clone()));
        }
        state
            .networks
            .insert(config.name.clone(), NetworkState::default());
        Ok(NetworkId::new(config.name.as_str()))
    }

    async fn remove_network(&self, id: &NetworkId) -> Result<(), NetworkError> {
        if let Some(msg) = self.injected("remove_network") {
            return Err(NetworkError::Runtime(msg));
        }
        let mut state = self.state.lock();
        let network = state
            .networks
            .get(id.as_str())
            .ok_or_else(|| NetworkError::NotFound(id.to_string()))?;
        if !network.connected.is_empty() {
            return Err(NetworkError::InUse(id.to_string()));
        }
        state.networks.remove(id.as_str());
        Ok(())
    }

    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError> {
        if let Some(msg) = self.injected("connect_to_network") {
            return Err(NetworkError::Runtime(msg));
        }
        let mut state = self.state.lock();
        let entry = state
            .networks
            .get_mut(network.as_str())
            .ok_or_else(|| NetworkError::NotFound(network.to_string()))?;
        if !entry.connected.insert(container.to_string()) {
            return Err(NetworkError::AlreadyConnected(container.to_string()));
        }
        Ok(())
    }

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError> {
        if let Some(msg) = self.injected("disconnect_from_network") {
            return Err(NetworkError::Runtime(msg));
        }
        let mut state = self.state.lock();
        let entry = state
            .networks
            .get_mut(network.as_str())
            .ok_or_else(|| NetworkError::NotFound(network.to_string()))?;
        if !entry.connected.remove(container.as_str()) {
            return Err(NetworkError::NotConnected(container.to_string()));
        }
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        Ok(self.state.lock().networks.contains_key(name))
    }
}

#[async_trait]
impl VolumeOps for FakeRuntime {
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError> {
        Ok(self.state.lock().volumes.contains_key(name))
    }

    async fn create_volume(&self, config: &VolumeConfig) -> Result<VolumeId, VolumeError> {
        if let Some(msg) = self.injected("create_volume") {
            return Err(VolumeError::Runtime(msg));
        }
        let mountpoint = match &self.volume_root {
            Some(root) => {
                let path = root.join(&config.name);
                std::fs::create_dir_all(&path).map_err(|e| VolumeError::Runtime(e.to_string()))?;
                path
            }
            None => PathBuf::from("/var/lib/docker/volumes")
                .join(&config.name)
                .join("_data"),
        };
        self.state.lock().volumes.insert(
            config.name.clone(),
            VolumeSummary {
                name: config.name.clone(),
                mountpoint,
                labels: config.labels.clone(),
            },
        );
        Ok(VolumeId::new(config.name.as_str()))
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeSummary, VolumeError> {
        self.state
            .lock()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))
    }

    async fn list_volumes(
        &self,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<VolumeSummary>, VolumeError> {
        if let Some(msg) = self.injected("list_volumes") {
            return Err(VolumeError::Runtime(msg));
        }
        Ok(self
            .state
            .lock()
            .volumes
            .values()
            .filter(|v| labels_match(&v.labels, labels))
            .cloned()
            .collect())
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<(), VolumeError> {
        if let Some(msg) = self.injected("remove_volume") {
            return Err(VolumeError::Runtime(msg));
        }
        self.state
            .lock()
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| VolumeError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl ExecOps for FakeRuntime {
    async fn exec(
        &self,
        container: &ContainerId,
        config: &ExecConfig,
    ) -> Result<ExecResult, ExecError> {
        if let Some(msg) = self.injected("exec") {
            return Err(ExecError::Runtime(msg));
        }
        self.state
            .lock()
            .execs
            .push((container.to_string(), config.clone()));
        let responder = self.responder.lock().clone();
        Ok(match responder {
            Some(f) => f(container.as_str(), config),
            None => ok_exec(),
        })
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        if let Some(msg) = self.injected("pull_image") {
            return Err(ImageError::PullFailed(msg));
        }
        let mut state = self.state.lock();
        state.pulled.push(reference.to_string());
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        Ok(self.state.lock().images.contains(&reference.to_string()))
    }
}

#[async_trait]
impl RuntimeInfo for FakeRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        Ok(RuntimeMetadata {
            name: "fake".to_string(),
            version: "0.0.0".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        match self.injected("ping") {
            Some(msg) => Err(RuntimeInfoError::ConnectionFailed(msg)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct DbState {
    databases: BTreeMap<String, Vec<String>>,
    users: BTreeSet<String>,
    unreachable: bool,
    deny_create: bool,
    cancel_on_create: Option<CancelToken>,
}

/// A MySQL server reduced to database names, their tables and user names.
#[derive(Clone, Default)]
pub(crate) struct FakeDatabase {
    state: Arc<Mutex<DbState>>,
}

impl FakeDatabase {
    pub(crate) fn with_database(self, name: &str, tables: &[&str]) -> Self {
        self.state.lock().databases.insert(
            name.to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub(crate) fn with_user(self, user: &str) -> Self {
        self.state.lock().users.insert(user.to_string());
        self
    }

    pub(crate) fn unreachable(self) -> Self {
        self.state.lock().unreachable = true;
        self
    }

    pub(crate) fn deny_create(self) -> Self {
        self.state.lock().deny_create = true;
        self
    }

    /// Fire `token` right after the next database is created.
    pub(crate) fn cancel_after_create(self, token: CancelToken) -> Self {
        self.state.lock().cancel_on_create = Some(token);
        self
    }

    pub(crate) fn has_database(&self, name: &str) -> bool {
        self.state.lock().databases.contains_key(name)
    }

    pub(crate) fn tables(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn has_user(&self, user: &str) -> bool {
        self.state.lock().users.contains(user)
    }

    fn reachable(&self) -> Result<(), ClientError> {
        if self.state.lock().unreachable {
            return Err(ClientError::Connection(
                "ERROR 2003 (HY000): Can't connect to MySQL server".to_string(),
            ));
        }
        Ok(())
    }

    /// Interpret one statement as `MysqlExecClient` sends it.
    fn answer(&self, config: &ExecConfig) -> ExecResult {
        let sql = config
            .env
            .iter()
            .find_map(|e| e.strip_prefix("SITEWRIGHT_SQL="))
            .or_else(|| config.cmd.iter().find_map(|a| a.strip_prefix("--execute=")))
            .unwrap_or_default()
            .to_string();
        let arg = first_quoted(&sql);

        let result: Result<Vec<String>, ClientError> = self.reachable().and_then(|()| {
            if sql == "SELECT 1" {
                Ok(vec!["1".to_string()])
            } else if sql.contains("INFORMATION_SCHEMA.SCHEMATA") {
                Ok(self.has_database(&arg).then(|| arg.clone()).into_iter().collect())
            } else if sql.contains("INFORMATION_SCHEMA.TABLES") {
                Ok(self.tables(&arg))
            } else if sql.starts_with("CREATE DATABASE") {
                self.create(&arg).map(|()| Vec::new())
            } else if sql.starts_with("DROP DATABASE") {
                self.state.lock().databases.remove(&arg);
                Ok(Vec::new())
            } else if sql.contains("FROM mysql.user") {
                Ok(self.has_user(&arg).then(|| arg.clone()).into_iter().collect())
            } else if sql.starts_with("CREATE USER") {
                self.state.lock().users.insert(arg.clone());
                Ok(Vec::new())
            } else if sql.starts_with("DROP USER") {
                self.state.lock().users.remove(&arg);
                Ok(Vec::new())
            } else {
                Err(ClientError::Statement(format!("unexpected statement: {sql}")))
            }
        });

        match result {
            Ok(rows) => ExecResult {
                exit_code: 0,
                stdout: rows.join("\n").into_bytes(),
                stderr: Vec::new(),
            },
            Err(ClientError::Connection(msg) | ClientError::Statement(msg)) => ExecResult {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: msg.into_bytes(),
            },
            Err(e) => ExecResult {
                exit_code: 1,
                stdout: Vec::new(),
                stderr: e.to_string().into_bytes(),
            },
        }
    }

    fn create(&self, name: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if state.deny_create {
            return Err(ClientError::Statement(
                "ERROR 1044 (42000): Access denied".to_string(),
            ));
        }
        if state.databases.contains_key(name) {
            return Err(ClientError::Statement(format!(
                "ERROR 1007 (HY000): Can't create database '{name}'; database exists"
            )));
        }
        state.databases.insert(name.to_string(), Vec::new());
        if let Some(token) = state.cancel_on_create.take() {
            token.cancel();
        }
        Ok(())
    }
}

/// Text between the first pair of quotes or backticks.
fn first_quoted(sql: &str) -> String {
    let Some(start) = sql.find(['\'', '`']) else {
        return String::new();
    };
    let quote = sql[start..].chars().next().unwrap_or('\'');
    let rest = &sql[start + 1..];
    rest.split(quote).next().unwrap_or_default().to_string()
}

#[async_trait]
impl DatabaseClient for FakeDatabase {
    async fn ping(&self) -> Result<(), ClientError> {
        self.reachable()
    }

    async fn database_exists(&self, name: &str) -> Result<bool, ClientError> {
        self.reachable()?;
        Ok(self.has_database(name))
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, ClientError> {
        self.reachable()?;
        Ok(self.tables(database))
    }

    async fn create_database(&self, name: &str) -> Result<(), ClientError> {
        self.reachable()?;
        self.create(name)
    }

    async fn drop_database(&self, name: &str) -> Result<(), ClientError> {
        self.reachable()?;
        self.state.lock().databases.remove(name);
        Ok(())
    }

    async fn user_exists(&self, user: &str) -> Result<bool, ClientError> {
        self.reachable()?;
        Ok(self.has_user(user))
    }

    async fn create_user(
        &self,
        user: &str,
        _password: &str,
        _database: &str,
    ) -> Result<(), ClientError> {
        self.reachable()?;
        self.state.lock().users.insert(user.to_string());
        Ok(())
    }

    async fn drop_user(&self, user: &str) -> Result<(), ClientError> {
        self.reachable()?;
        self.state.lock().users.remove(user);
        Ok(())
    }
}

/// Hands out probes whose client is a shared [`FakeDatabase`].
pub(crate) struct FakeProbeLauncher {
    db: FakeDatabase,
    launches: AtomicUsize,
    releases_started: AtomicUsize,
    releases: AtomicUsize,
    release_delay: Mutex<Duration>,
}

impl FakeProbeLauncher {
    pub(crate) fn new(db: FakeDatabase) -> Self {
        Self {
            db,
            launches: AtomicUsize::new(0),
            releases_started: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            release_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Make every release take `delay` before it completes.
    pub(crate) fn slow_release(&self, delay: Duration) {
        *self.release_delay.lock() = delay;
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn releases_started(&self) -> usize {
        self.releases_started.load(Ordering::SeqCst)
    }

    /// Releases that ran to completion.
    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeLauncher for FakeProbeLauncher {
    async fn launch(&self, _credentials: &crate::site::DbCredentials) -> Result<Probe, DbError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Probe {
            container: ContainerId::new(format!("fake-probe-{n}")),
            client: Box::new(self.db.clone()),
        })
    }

    async fn release(&self, _probe: Probe) -> Result<(), DbError> {
        self.releases_started.fetch_add(1, Ordering::SeqCst);
        let delay = *self.release_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Compose that registers the project's containers on the fake runtime.
pub(crate) struct FakeCompose {
    runtime: Arc<FakeRuntime>,
    calls: Mutex<Vec<(String, String, Vec<String>)>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeCompose {
    pub(crate) fn new(runtime: Arc<FakeRuntime>) -> Self {
        Self {
            runtime,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make `action` (`up` or `restart`) exit non-zero.
    pub(crate) fn fail_on(&self, action: &str) {
        self.failing.lock().insert(action.to_string());
    }

    /// `(action, project, services)` for every call, in order.
    pub(crate) fn calls(&self) -> Vec<(String, String, Vec<String>)> {
        self.calls.lock().clone()
    }

    fn record(
        &self,
        action: &str,
        project: &ComposeProject,
        services: &[&str],
    ) -> Result<(), ComposeError> {
        self.calls.lock().push((
            action.to_string(),
            project.name.clone(),
            services.iter().map(|s| s.to_string()).collect(),
        ));
        if self.failing.lock().contains(action) {
            return Err(ComposeError::Failed {
                action: action.to_string(),
                code: Some(1),
                stderr: "service \"php\" failed to start".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ComposeOps for FakeCompose {
    async fn up(&self, project: &ComposeProject, services: &[&str]) -> Result<(), ComposeError> {
        // Containers exist even when a service then fails to start.
        for kind in [ServiceKind::Nginx, ServiceKind::Php, ServiceKind::Postfix] {
            self.runtime.add_container(
                &kind.container_name(&project.name),
                HashMap::from([(COMPOSE_PROJECT_LABEL.to_string(), project.name.clone())]),
            );
        }
        self.record("up", project, services)
    }

    async fn restart(
        &self,
        project: &ComposeProject,
        services: &[&str],
    ) -> Result<(), ComposeError> {
        self.record("restart", project, services)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusBehavior {
    Ready,
    Fail,
    Hang,
}

pub(crate) struct FakeStatus {
    behavior: Mutex<StatusBehavior>,
    checked: AtomicUsize,
}

impl FakeStatus {
    pub(crate) fn new(behavior: StatusBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            checked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set(&self, behavior: StatusBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub(crate) fn checked(&self) -> usize {
        self.checked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for FakeStatus {
    async fn wait_ready(&self, url: &SiteUrl) -> Result<(), StatusError> {
        self.checked.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock();
        match behavior {
            StatusBehavior::Ready => Ok(()),
            StatusBehavior::Fail => Err(StatusError::NotReady {
                url: url.to_string(),
                timeout: Duration::from_secs(1),
                last: "HTTP 502".to_string(),
            }),
            StatusBehavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeIssuer {
    failing: Mutex<bool>,
    issued: Mutex<Vec<String>>,
}

impl FakeIssuer {
    pub(crate) fn fail(&self) {
        *self.failing.lock() = true;
    }

    pub(crate) fn issued(&self) -> Vec<String> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl CertificateIssuer for FakeIssuer {
    async fn issue(&self, site: &SiteParams) -> Result<(), TlsError> {
        if *self.failing.lock() {
            return Err(TlsError::Failed {
                program: "acme".to_string(),
                code: Some(1),
                stderr: "rate limited".to_string(),
            });
        }
        self.issued.lock().push(site.url().to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreateFailure {
    Io,
    Exists,
}

/// In-memory SQLite store whose `create` can be made to fail.
pub(crate) struct FakeRecords {
    inner: SqliteRecordStore,
    fail_create: Mutex<Option<CreateFailure>>,
}

impl FakeRecords {
    pub(crate) fn new() -> Self {
        Self {
            inner: SqliteRecordStore::in_memory().unwrap(),
            fail_create: Mutex::new(None),
        }
    }

    pub(crate) fn fail_create(&self, failure: CreateFailure) {
        *self.fail_create.lock() = Some(failure);
    }
}

impl RecordStore for FakeRecords {
    fn find(&self, url: &SiteUrl) -> Result<Option<SiteRecord>, RecordError> {
        self.inner.find(url)
    }

    fn create(&self, record: &SiteRecord) -> Result<(), RecordError> {
        match *self.fail_create.lock() {
            Some(CreateFailure::Io) => Err(RecordError::Io(std::io::Error::other("disk full"))),
            Some(CreateFailure::Exists) => {
                Err(RecordError::AlreadyExists(record.site_url.to_string()))
            }
            None => self.inner.create(record),
        }
    }

    fn domains(&self) -> Result<BTreeSet<String>, RecordError> {
        self.inner.domains()
    }

    fn remove(&self, url: &SiteUrl) -> Result<(), RecordError> {
        self.inner.remove(url)
    }
}

/// A provisioner wired to fakes inside a temporary directory.
pub(crate) struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub runtime: Arc<FakeRuntime>,
    pub compose: Arc<FakeCompose>,
    pub records: Arc<FakeRecords>,
    pub status: Arc<FakeStatus>,
    pub issuer: Arc<FakeIssuer>,
    pub shared_db: FakeDatabase,
    pub remote_db: FakeDatabase,
    pub probes: Arc<FakeProbeLauncher>,
    pub platform: Platform,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            sites_root: dir.path().join("sites"),
            hosts_file: dir.path().join("hosts"),
            ..Settings::default()
        };
        std::fs::write(&settings.hosts_file, "127.0.0.1\tlocalhost\n").unwrap();

        let runtime = Arc::new(FakeRuntime::new(dir.path().join("volumes")));
        runtime.add_container(&settings.proxy.container, HashMap::new());
        let shared_db = FakeDatabase::default();
        runtime.serve_mysql(&settings.shared.db_container, shared_db.clone());
        let remote_db = FakeDatabase::default();

        Self {
            compose: Arc::new(FakeCompose::new(runtime.clone())),
            records: Arc::new(FakeRecords::new()),
            status: Arc::new(FakeStatus::new(StatusBehavior::Ready)),
            issuer: Arc::new(FakeIssuer::default()),
            probes: Arc::new(FakeProbeLauncher::new(remote_db.clone())),
            platform: Platform::Linux,
            dir,
            settings,
            runtime,
            shared_db,
            remote_db,
        }
    }

    pub(crate) fn site(&self, url: &str, f: impl FnOnce(&mut SiteRequest)) -> SiteParams {
        let mut request = SiteRequest {
            url: url.to_string(),
            ..Default::default()
        };
        f(&mut request);
        validate(
            &request,
            &self.settings,
            self.records.as_ref(),
            &mut Diagnostics::default(),
        )
        .unwrap()
    }

    pub(crate) fn provisioner(&self) -> Provisioner<FakeRuntime> {
        Provisioner::new(Collaborators {
            runtime: self.runtime.clone(),
            compose: self.compose.clone(),
            templates: Arc::new(Templates::embedded().unwrap()),
            records: self.records.clone(),
            hosts: Arc::new(HostsFile::new(self.settings.hosts_file.clone())),
            tls: self.issuer.clone(),
            status: self.status.clone(),
            probes: self.probes.clone(),
            settings: self.settings.clone(),
            platform: self.platform,
        })
    }

    pub(crate) fn hosts(&self) -> String {
        std::fs::read_to_string(&self.settings.hosts_file).unwrap()
    }
}
