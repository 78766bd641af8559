use iaas_setup::{
    Availability, IaasError, InstanceStatus, Resource, ResourceId, Result, RetryableSetup,
    SetupOptions,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    pub id: ResourceId,
    pub availability: Availability,
    pub instance_status: Option<InstanceStatus>,
}

impl Resource for Disk {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn availability(&self) -> Option<Availability> {
        Some(self.availability)
    }

    fn instance_status(&self) -> Option<InstanceStatus> {
        self.instance_status
    }
}

pub type State = (Availability, Option<InstanceStatus>);

#[derive(Default)]
struct Inner {
    next_id: u64,
    create_calls: u32,
    read_calls: u32,
    delete_calls: u32,
    provision_calls: u32,
    // read sequence for each created resource, in creation order
    scripts: VecDeque<Vec<State>>,
    live: HashMap<ResourceId, VecDeque<State>>,
    fail_create: bool,
    fail_read: bool,
    failing_deletes: u32,
    failing_provisions: u32,
}

/// In-memory stand-in for the wrapped API
#[derive(Default)]
pub struct FakeCloud {
    inner: Mutex<Inner>,
}

#[allow(dead_code)]
impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every created resource reads through `states`, repeating the last one
    pub fn script(self: &Arc<Self>, states: Vec<State>) -> Arc<Self> {
        self.inner.lock().unwrap().scripts.push_back(states);
        self.clone()
    }

    pub fn fail_create(self: &Arc<Self>) -> Arc<Self> {
        self.inner.lock().unwrap().fail_create = true;
        self.clone()
    }

    pub fn fail_read(self: &Arc<Self>) -> Arc<Self> {
        self.inner.lock().unwrap().fail_read = true;
        self.clone()
    }

    pub fn fail_deletes(self: &Arc<Self>, count: u32) -> Arc<Self> {
        self.inner.lock().unwrap().failing_deletes = count;
        self.clone()
    }

    pub fn fail_provisions(self: &Arc<Self>, count: u32) -> Arc<Self> {
        self.inner.lock().unwrap().failing_provisions = count;
        self.clone()
    }

    pub fn create_calls(&self) -> u32 {
        self.inner.lock().unwrap().create_calls
    }

    pub fn read_calls(&self) -> u32 {
        self.inner.lock().unwrap().read_calls
    }

    pub fn delete_calls(&self) -> u32 {
        self.inner.lock().unwrap().delete_calls
    }

    pub fn provision_calls(&self) -> u32 {
        self.inner.lock().unwrap().provision_calls
    }

    pub async fn create(&self) -> Result<Disk> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;
        if inner.fail_create {
            return Err(IaasError::ApiError("create rejected".into()));
        }

        inner.next_id += 1;
        let id = ResourceId(inner.next_id);
        let script = if inner.scripts.len() > 1 {
            inner.scripts.pop_front().unwrap_or_default()
        } else {
            inner.scripts.front().cloned().unwrap_or_default()
        };
        inner.live.insert(id, script.into_iter().collect());

        Ok(Disk {
            id,
            availability: Availability::Migrating,
            instance_status: None,
        })
    }

    pub async fn read(&self, id: ResourceId) -> Result<Disk> {
        let mut inner = self.inner.lock().unwrap();
        inner.read_calls += 1;
        if inner.fail_read {
            return Err(IaasError::ApiError("read rejected".into()));
        }

        let states = inner
            .live
            .get_mut(&id)
            .ok_or_else(|| IaasError::ResourceNotFound(id.to_string()))?;
        let (availability, instance_status) = if states.len() > 1 {
            states.pop_front().unwrap_or((Availability::Unknown, None))
        } else {
            states.front().copied().unwrap_or((Availability::Unknown, None))
        };

        Ok(Disk {
            id,
            availability,
            instance_status,
        })
    }

    pub async fn delete(&self, id: ResourceId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.delete_calls += 1;
        if inner.failing_deletes > 0 {
            inner.failing_deletes -= 1;
            return Err(IaasError::ApiError("copy still in progress".into()));
        }
        inner.live.remove(&id);
        Ok(())
    }

    pub async fn provision(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.provision_calls += 1;
        if inner.failing_provisions > 0 {
            inner.failing_provisions -= 1;
            return Err(IaasError::ApiError("settings rejected".into()));
        }
        Ok(())
    }
}

/// Options with short, distinct timings so paused-clock tests stay readable
#[allow(dead_code)]
pub fn fast_options() -> SetupOptions {
    SetupOptions::default()
        .with_retry_count(2)
        .with_polling_interval(Duration::from_secs(1))
        .with_delete_retry(1, Duration::from_millis(100))
        .with_provisioning_retry(3, Duration::from_millis(100))
}

/// Route engine logs to the captured test output
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Setup wired to every collaborator of `cloud`
#[allow(dead_code)]
pub fn setup_for(cloud: &Arc<FakeCloud>) -> RetryableSetup<Disk> {
    init_tracing();
    let create = cloud.clone();
    let read = cloud.clone();
    let delete = cloud.clone();

    RetryableSetup::new()
        .create(move |_zone| {
            let cloud = create.clone();
            async move { cloud.create().await }
        })
        .read(move |_zone, id| {
            let cloud = read.clone();
            async move { cloud.read(id).await }
        })
        .delete(move |_zone, id| {
            let cloud = delete.clone();
            async move { cloud.delete(id).await }
        })
        .options(fast_options())
}

#[allow(dead_code)]
pub fn with_provisioning(setup: RetryableSetup<Disk>, cloud: &Arc<FakeCloud>) -> RetryableSetup<Disk> {
    let provision = cloud.clone();
    setup.provision_before_up(move |_zone, _id, _target| {
        let cloud = provision.clone();
        async move { cloud.provision().await }
    })
}
