// SAPControl request/response types
use super::sap_error::SapError;
use super::soap_envelope::XmlElement;
use std::fmt;
use std::str::FromStr;

/// Health indicator used by sapstartsrv for instances, processes and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateColor {
    Gray,
    Green,
    Yellow,
    Red,
}

impl StateColor {
    pub const ALL: [StateColor; 4] = [
        StateColor::Gray,
        StateColor::Green,
        StateColor::Yellow,
        StateColor::Red,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateColor::Gray => "SAPControl-GRAY",
            StateColor::Green => "SAPControl-GREEN",
            StateColor::Yellow => "SAPControl-YELLOW",
            StateColor::Red => "SAPControl-RED",
        }
    }

    /// Numeric severity exported as metric value.
    pub fn code(&self) -> u8 {
        match self {
            StateColor::Gray => 1,
            StateColor::Green => 2,
            StateColor::Yellow => 3,
            StateColor::Red => 4,
        }
    }

    /// Log level attached to alert lines.
    pub fn level(&self) -> &'static str {
        match self {
            StateColor::Gray => "unknown",
            StateColor::Green => "info",
            StateColor::Yellow => "warning",
            StateColor::Red => "error",
        }
    }
}

impl FromStr for StateColor {
    type Err = SapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateColor::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SapError::InvalidStateColor(s.to_string()))
    }
}

impl fmt::Display for StateColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown colors map to 0 together with the error, so callers can still export.
pub fn state_color_to_float(color: &str) -> Result<f64, (f64, SapError)> {
    color
        .parse::<StateColor>()
        .map(|c| c.code() as f64)
        .map_err(|e| (0.0, e))
}

pub fn state_color_to_level(color: &str) -> Result<&'static str, (&'static str, SapError)> {
    color
        .parse::<StateColor>()
        .map(|c| c.level())
        .map_err(|e| ("alert", e))
}

/// Maps a response element onto a typed struct.
pub trait FromXml: Sized {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError>;
}

fn parse_num<T: FromStr + Default>(el: &XmlElement, field: &str) -> Result<T, SapError> {
    let raw = el.child_text(field).trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    raw.parse()
        .map_err(|_| SapError::Parse(format!("invalid {} value: {}", field, raw)))
}

fn parse_items<T: FromXml>(el: &XmlElement, list: &str) -> Result<Vec<T>, SapError> {
    el.items(list).map(T::from_xml).collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SapInstance {
    pub hostname: String,
    pub instance_nr: i32,
    pub http_port: i32,
    pub https_port: i32,
    pub start_priority: String,
    pub features: String,
    pub dispstatus: String,
}

impl FromXml for SapInstance {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(SapInstance {
            hostname: el.child_text("hostname").to_string(),
            instance_nr: parse_num(el, "instanceNr")?,
            http_port: parse_num(el, "httpPort")?,
            https_port: parse_num(el, "httpsPort")?,
            start_priority: el.child_text("startPriority").to_string(),
            features: el.child_text("features").to_string(),
            dispstatus: el.child_text("dispstatus").to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetSystemInstanceListResponse {
    pub instances: Vec<SapInstance>,
}

impl FromXml for GetSystemInstanceListResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Self {
            instances: parse_items(el, "instance")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceProperty {
    pub property: String,
    pub property_type: String,
    pub value: String,
}

impl FromXml for InstanceProperty {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(InstanceProperty {
            property: el.child_text("property").to_string(),
            property_type: el.child_text("propertytype").to_string(),
            value: el.child_text("value").to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetInstancePropertiesResponse {
    pub properties: Vec<InstanceProperty>,
}

impl GetInstancePropertiesResponse {
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.property == property)
            .map(|p| p.value.as_str())
    }
}

impl FromXml for GetInstancePropertiesResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Self {
            properties: parse_items(el, "properties")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsProcess {
    pub name: String,
    pub description: String,
    pub dispstatus: String,
    pub textstatus: String,
    pub starttime: String,
    pub elapsedtime: String,
    pub pid: i32,
}

impl FromXml for OsProcess {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(OsProcess {
            name: el.child_text("name").to_string(),
            description: el.child_text("description").to_string(),
            dispstatus: el.child_text("dispstatus").to_string(),
            textstatus: el.child_text("textstatus").to_string(),
            starttime: el.child_text("starttime").to_string(),
            elapsedtime: el.child_text("elapsedtime").to_string(),
            pid: parse_num(el, "pid")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetProcessListResponse {
    pub processes: Vec<OsProcess>,
}

impl FromXml for GetProcessListResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Self {
            processes: parse_items(el, "process")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskHandlerQueue {
    pub queue_type: String,
    pub now: i32,
    pub high: i32,
    pub max: i32,
    pub writes: i32,
    pub reads: i32,
}

impl FromXml for TaskHandlerQueue {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(TaskHandlerQueue {
            queue_type: el.child_text("Typ").to_string(),
            now: parse_num(el, "Now")?,
            high: parse_num(el, "High")?,
            max: parse_num(el, "Max")?,
            writes: parse_num(el, "Writes")?,
            reads: parse_num(el, "Reads")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetQueueStatisticResponse {
    pub queues: Vec<TaskHandlerQueue>,
}

impl FromXml for GetQueueStatisticResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Self {
            queues: parse_items(el, "queue")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Alert {
    pub object: String,
    pub attribute: String,
    pub value: String,
    pub description: String,
    pub time: String,
    pub tid: String,
    pub aid: String,
}

impl FromXml for Alert {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Alert {
            object: el.child_text("Object").to_string(),
            attribute: el.child_text("Attribute").to_string(),
            value: el.child_text("Value").to_string(),
            description: el.child_text("Description").to_string(),
            time: el.child_text("Time").to_string(),
            tid: el.child_text("Tid").to_string(),
            aid: el.child_text("Aid").to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetAlertsResponse {
    pub root_tid_name: String,
    pub alerts: Vec<Alert>,
}

impl FromXml for GetAlertsResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Self {
            root_tid_name: el.child_text("RootTidName").to_string(),
            alerts: parse_items(el, "alert")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkProcess {
    pub no: String,
    pub wp_type: String,
    pub pid: String,
    pub status: String,
    pub reason: String,
    pub start: String,
    pub err: String,
    pub sem: String,
    pub cpu: String,
    pub time: String,
    pub program: String,
    pub client: String,
    pub user: String,
    pub action: String,
    pub table: String,
}

impl FromXml for WorkProcess {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        let text = |field: &str| el.child_text(field).to_string();
        Ok(WorkProcess {
            no: text("No"),
            wp_type: text("Typ"),
            pid: text("Pid"),
            status: text("Status"),
            reason: text("Reason"),
            start: text("Start"),
            err: text("Err"),
            sem: text("Sem"),
            cpu: text("Cpu"),
            time: text("Time"),
            program: text("Program"),
            client: text("Client"),
            user: text("User"),
            action: text("Action"),
            table: text("Table"),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AbapGetWpTableResponse {
    pub work_processes: Vec<WorkProcess>,
}

impl FromXml for AbapGetWpTableResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        Ok(Self {
            work_processes: parse_items(el, "workprocess")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqGetStatisticResponse {
    pub owner_now: i32,
    pub owner_high: i32,
    pub owner_max: i32,
    pub owner_state: String,
    pub arguments_now: i32,
    pub arguments_high: i32,
    pub arguments_max: i32,
    pub arguments_state: String,
    pub locks_now: i32,
    pub locks_high: i32,
    pub locks_max: i32,
    pub locks_state: String,
    pub enqueue_requests: i64,
    pub enqueue_rejects: i64,
    pub enqueue_errors: i64,
    pub dequeue_requests: i64,
    pub dequeue_errors: i64,
    pub dequeue_all_requests: i64,
    pub cleanup_requests: i64,
    pub backup_requests: i64,
    pub reporting_requests: i64,
    pub compress_requests: i64,
    pub verify_requests: i64,
    pub lock_time: f64,
    pub lock_wait_time: f64,
    pub server_time: f64,
    pub replication_state: String,
}

impl FromXml for EnqGetStatisticResponse {
    fn from_xml(el: &XmlElement) -> Result<Self, SapError> {
        // some releases wrap the counters in an extra element
        let el = el
            .children
            .iter()
            .find(|c| c.child("owner-now").is_some())
            .unwrap_or(el);
        Ok(EnqGetStatisticResponse {
            owner_now: parse_num(el, "owner-now")?,
            owner_high: parse_num(el, "owner-high")?,
            owner_max: parse_num(el, "owner-max")?,
            owner_state: el.child_text("owner-state").to_string(),
            arguments_now: parse_num(el, "arguments-now")?,
            arguments_high: parse_num(el, "arguments-high")?,
            arguments_max: parse_num(el, "arguments-max")?,
            arguments_state: el.child_text("arguments-state").to_string(),
            locks_now: parse_num(el, "locks-now")?,
            locks_high: parse_num(el, "locks-high")?,
            locks_max: parse_num(el, "locks-max")?,
            locks_state: el.child_text("locks-state").to_string(),
            enqueue_requests: parse_num(el, "enqueue-requests")?,
            enqueue_rejects: parse_num(el, "enqueue-rejects")?,
            enqueue_errors: parse_num(el, "enqueue-errors")?,
            dequeue_requests: parse_num(el, "dequeue-requests")?,
            dequeue_errors: parse_num(el, "dequeue-errors")?,
            dequeue_all_requests: parse_num(el, "dequeue-all-requests")?,
            cleanup_requests: parse_num(el, "cleanup-requests")?,
            backup_requests: parse_num(el, "backup-requests")?,
            reporting_requests: parse_num(el, "reporting-requests")?,
            compress_requests: parse_num(el, "compress-requests")?,
            verify_requests: parse_num(el, "verify-requests")?,
            lock_time: parse_num(el, "lock-time")?,
            lock_wait_time: parse_num(el, "lock-wait-time")?,
            server_time: parse_num(el, "server-time")?,
            replication_state: el.child_text("replication-state").to_string(),
        })
    }
}
