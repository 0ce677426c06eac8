use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vmflow_api::{
    ApiError, DiskInfo, DiskKey, DiskSpec, Gateway, GuestInterface, ImportStatus, MachineId,
    NicKey, NicSpec, PowerAction, VmKey, VmSpec,
};
use vmflow_builder::{
    BuildContext, BuildSettings, CommandExecutor, ExecError, RemoteCommand, RemoteSession,
};

const GB: u64 = 1024 * 1024 * 1024;

/// Every call the fake gateway received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateVm(String),
    ReadMachineId,
    DeleteVm,
    CreateDisk(String),
    ReadDisk(String),
    ResizeDisk(String, u64),
    ImportStatus(String),
    CreateNic(String),
    Power(PowerAction),
    IsRunning,
    GuestAgent,
}

/// Scripted answer: a value or an API error with this status
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail(u16),
}

pub fn api_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        endpoint: "fake".into(),
        body: "scripted failure".into(),
    }
}

fn answer<T>(reply: Reply<T>) -> vmflow_api::Result<T> {
    match reply {
        Reply::Ok(v) => Ok(v),
        Reply::Fail(status) => Err(api_error(status)),
    }
}

/// In-memory control plane recording every call
pub struct FakeGateway {
    calls: Mutex<Vec<Call>>,
    pub machine_id: Option<MachineId>,
    pub fail_create_vm: bool,
    pub fail_disk: Option<String>,
    pub fail_nic: Option<String>,
    pub fail_power_on: bool,
    pub fail_kill: bool,
    pub fail_delete: bool,
    /// Size reported right after creation, by disk name
    pub imported_size_gb: HashMap<String, u64>,
    import_statuses: Mutex<VecDeque<Reply<ImportStatus>>>,
    running: Mutex<VecDeque<Reply<bool>>>,
    pub running_default: bool,
    agent: Mutex<VecDeque<Reply<Vec<&'static str>>>>,
    disks: Mutex<HashMap<String, (String, u64)>>,
    next_disk: Mutex<u32>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            machine_id: Some(MachineId(40)),
            fail_create_vm: false,
            fail_disk: None,
            fail_nic: None,
            fail_power_on: false,
            fail_kill: false,
            fail_delete: false,
            imported_size_gb: HashMap::new(),
            import_statuses: Mutex::new(VecDeque::new()),
            running: Mutex::new(VecDeque::new()),
            running_default: true,
            agent: Mutex::new(VecDeque::new()),
            disks: Mutex::new(HashMap::new()),
            next_disk: Mutex::new(0),
        }
    }
}

#[allow(dead_code)]
impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import status answers, in order; once drained the disk is "online"
    pub fn with_import_statuses(self, statuses: Vec<Reply<ImportStatus>>) -> Self {
        *self.import_statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Running-state answers, in order; once drained `running_default` is used
    pub fn with_running(self, answers: Vec<Reply<bool>>) -> Self {
        *self.running.lock().unwrap() = answers.into();
        self
    }

    /// Guest agent answers, in order; the last one repeats
    pub fn with_agent(self, answers: Vec<Reply<Vec<&'static str>>>) -> Self {
        *self.agent.lock().unwrap() = answers.into();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn count_matching(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn create_vm(&self, vm: &VmSpec) -> vmflow_api::Result<VmKey> {
        self.record(Call::CreateVm(vm.name.clone()));
        if self.fail_create_vm {
            return Err(api_error(500));
        }
        Ok(VmKey::new("vm-1"))
    }

    async fn vm_machine_id(&self, _key: &VmKey) -> vmflow_api::Result<Option<MachineId>> {
        self.record(Call::ReadMachineId);
        Ok(self.machine_id)
    }

    async fn delete_vm(&self, _key: &VmKey) -> vmflow_api::Result<()> {
        self.record(Call::DeleteVm);
        if self.fail_delete {
            return Err(api_error(500));
        }
        Ok(())
    }

    async fn create_disk(&self, _machine: MachineId, disk: &DiskSpec) -> vmflow_api::Result<DiskKey> {
        self.record(Call::CreateDisk(disk.name.clone()));
        if self.fail_disk.as_deref() == Some(disk.name.as_str()) {
            return Err(api_error(400));
        }
        let mut next = self.next_disk.lock().unwrap();
        *next += 1;
        let key = format!("disk-{}", *next);
        let size_gb = self
            .imported_size_gb
            .get(&disk.name)
            .copied()
            .or(disk.size_gb)
            .unwrap_or(0);
        self.disks
            .lock()
            .unwrap()
            .insert(key.clone(), (disk.name.clone(), size_gb * GB));
        Ok(DiskKey::new(key))
    }

    async fn read_disk(&self, key: &DiskKey) -> vmflow_api::Result<DiskInfo> {
        self.record(Call::ReadDisk(key.to_string()));
        let disks = self.disks.lock().unwrap();
        let (name, size_bytes) = disks.get(key.as_str()).cloned().ok_or_else(|| api_error(404))?;
        Ok(DiskInfo {
            name,
            size_bytes,
            media: Some("import".into()),
            interface: Some("virtio-scsi".into()),
        })
    }

    async fn resize_disk(&self, key: &DiskKey, size_gb: u64) -> vmflow_api::Result<()> {
        self.record(Call::ResizeDisk(key.to_string(), size_gb));
        let mut disks = self.disks.lock().unwrap();
        let disk = disks.get_mut(key.as_str()).ok_or_else(|| api_error(404))?;
        disk.1 = size_gb * GB;
        Ok(())
    }

    async fn disk_import_status(&self, key: &DiskKey) -> vmflow_api::Result<ImportStatus> {
        self.record(Call::ImportStatus(key.to_string()));
        let next = self.import_statuses.lock().unwrap().pop_front();
        answer(next.unwrap_or(Reply::Ok(ImportStatus::Terminal("online".into()))))
    }

    async fn create_nic(&self, _machine: MachineId, nic: &NicSpec) -> vmflow_api::Result<NicKey> {
        self.record(Call::CreateNic(nic.name.clone()));
        if self.fail_nic.as_deref() == Some(nic.name.as_str()) {
            return Err(api_error(400));
        }
        Ok(NicKey::new(format!("nic-{}", nic.name)))
    }

    async fn power_action(&self, _key: &VmKey, action: PowerAction) -> vmflow_api::Result<()> {
        self.record(Call::Power(action));
        match action {
            PowerAction::PowerOn if self.fail_power_on => Err(api_error(409)),
            PowerAction::Kill if self.fail_kill => Err(api_error(500)),
            _ => Ok(()),
        }
    }

    async fn is_running(&self, _key: &VmKey) -> vmflow_api::Result<bool> {
        self.record(Call::IsRunning);
        let next = self.running.lock().unwrap().pop_front();
        answer(next.unwrap_or(Reply::Ok(self.running_default)))
    }

    async fn guest_agent_networks(&self, _key: &VmKey) -> vmflow_api::Result<Vec<GuestInterface>> {
        self.record(Call::GuestAgent);
        let reply = {
            let mut agent = self.agent.lock().unwrap();
            if agent.len() > 1 {
                agent.pop_front()
            } else {
                agent.front().cloned()
            }
        };
        let addresses = answer(reply.unwrap_or(Reply::Ok(Vec::new())))?;
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![GuestInterface {
            name: "eth0".into(),
            ipv4: addresses
                .iter()
                .map(|a| a.parse::<Ipv4Addr>().unwrap())
                .collect(),
        }])
    }
}

/// How a scripted guest command behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Exit(i32),
    StartFails,
    WaitFails,
    Hang,
}

#[derive(Default)]
struct ExecutorInner {
    scripts: HashMap<String, Behaviour>,
    started: Mutex<Vec<String>>,
    connects: Mutex<Vec<String>>,
}

/// Guest transport with scripted commands; unknown commands exit 0
#[derive(Clone, Default)]
pub struct FakeExecutor {
    inner: Arc<ExecutorInner>,
    connect_fails: bool,
    unreachable: HashSet<String>,
}

#[allow(dead_code)]
impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, command: &str, behaviour: Behaviour) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("script before sharing the executor")
            .scripts
            .insert(command.to_string(), behaviour);
        self
    }

    pub fn refusing_connections(mut self) -> Self {
        self.connect_fails = true;
        self
    }

    pub fn unreachable_host(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.inner.started.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.inner.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn connect(&self, host: &str) -> Result<Box<dyn RemoteSession>, ExecError> {
        self.inner.connects.lock().unwrap().push(host.to_string());
        if self.connect_fails || self.unreachable.contains(host) {
            return Err(ExecError::Connection(format!("{}: connection refused", host)));
        }
        Ok(Box::new(FakeSession {
            inner: self.inner.clone(),
        }))
    }
}

struct FakeSession {
    inner: Arc<ExecutorInner>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn start(&self, command: &str) -> Result<Box<dyn RemoteCommand>, ExecError> {
        let behaviour = self
            .inner
            .scripts
            .get(command)
            .copied()
            .unwrap_or(Behaviour::Exit(0));
        if behaviour == Behaviour::StartFails {
            return Err(ExecError::Start("channel closed".into()));
        }
        self.inner.started.lock().unwrap().push(command.to_string());
        Ok(Box::new(FakeCommand { behaviour }))
    }
}

struct FakeCommand {
    behaviour: Behaviour,
}

#[async_trait]
impl RemoteCommand for FakeCommand {
    async fn wait(&mut self) -> Result<i32, ExecError> {
        match self.behaviour {
            Behaviour::Exit(code) => Ok(code),
            Behaviour::WaitFails => Err(ExecError::Wait("session dropped".into())),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::StartFails => unreachable!(),
        }
    }
}

/// Short timings so paused-clock tests stay readable
#[allow(dead_code)]
pub fn fast_settings() -> BuildSettings {
    BuildSettings {
        power_poll_interval: Duration::from_secs(1),
        power_on_timeout: Duration::from_secs(10),
        guest_agent_poll_interval: Duration::from_secs(2),
        ip_wait_timeout: Duration::from_secs(60),
        ip_settle_poll_interval: Duration::from_secs(1),
        ip_settle_window: Duration::from_secs(2),
        shutdown_timeout: Duration::from_secs(30),
        shutdown_drain: Duration::from_secs(3),
        import_settle_delay: Duration::from_secs(1),
        import_poll_interval: Duration::from_secs(1),
        import_max_retries: 5,
    }
}

/// A context over the given fake with fast timings
#[allow(dead_code)]
pub fn context(gateway: &Arc<FakeGateway>, spec: VmSpec) -> BuildContext {
    let gateway: Arc<dyn Gateway> = gateway.clone();
    BuildContext::new(gateway, spec).with_settings(fast_settings())
}
