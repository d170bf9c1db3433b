use std::{
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
};

use serde_json::Value;
use upstart::control::{
    Condition, ControlError, EmitRequest, JobControl, JobStatus, LogPriority,
    SystemControl, default_instance_path, job_name_from_path, job_object_path,
    with_log_priority,
};

/// In-memory stand-in for a running daemon.
struct FakeUpstart {
    priority: RefCell<LogPriority>,
    priority_history: RefCell<Vec<LogPriority>>,
    emitted: RefCell<Vec<(String, Vec<String>, bool)>>,
    job_paths: Vec<String>,
}

impl FakeUpstart {
    fn new() -> Self {
        Self {
            priority: RefCell::new(LogPriority::Message),
            priority_history: RefCell::new(Vec::new()),
            emitted: RefCell::new(Vec::new()),
            job_paths: ["cron", "smbd", "network-interface"]
                .iter()
                .map(|name| job_object_path(name).unwrap())
                .collect(),
        }
    }
}

impl SystemControl for FakeUpstart {
    fn version(&self) -> Result<String, ControlError> {
        Ok("init (upstart 1.12.1)".to_string())
    }

    fn log_priority(&self) -> Result<LogPriority, ControlError> {
        Ok(*self.priority.borrow())
    }

    fn set_log_priority(&self, priority: LogPriority) -> Result<(), ControlError> {
        self.priority_history.borrow_mut().push(priority);
        *self.priority.borrow_mut() = priority;
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<String>, ControlError> {
        Ok(self
            .job_paths
            .iter()
            .map(|path| job_name_from_path(path).to_string())
            .collect())
    }

    fn emit(&self, request: &EmitRequest) -> Result<(), ControlError> {
        self.emitted.borrow_mut().push((
            request.name.clone(),
            request.env_assignments(),
            request.wait,
        ));
        Ok(())
    }
}

/// In-memory job that tracks its goal and state.
struct FakeJob {
    name: String,
    running: RefCell<bool>,
    starts: RefCell<u32>,
}

impl FakeJob {
    fn new(name: &str) -> Result<Self, ControlError> {
        job_object_path(name)?;
        Ok(Self {
            name: name.to_string(),
            running: RefCell::new(false),
            starts: RefCell::new(0),
        })
    }
}

impl JobControl for FakeJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), ControlError> {
        if *self.running.borrow() {
            return Err(ControlError::Rejected(format!("{}: already running", self.name)));
        }
        *self.running.borrow_mut() = true;
        *self.starts.borrow_mut() += 1;
        Ok(())
    }

    fn stop(&self) -> Result<(), ControlError> {
        if !*self.running.borrow() {
            return Err(ControlError::Rejected(format!("{}: not running", self.name)));
        }
        *self.running.borrow_mut() = false;
        Ok(())
    }

    fn restart(&self) -> Result<(), ControlError> {
        self.stop()?;
        self.start()
    }

    fn status(&self) -> Result<JobStatus, ControlError> {
        let running = *self.running.borrow();
        let mut status = JobStatus::default();
        status
            .properties
            .insert("name".to_string(), Value::from(""));
        status.properties.insert(
            "goal".to_string(),
            Value::from(if running { "start" } else { "stop" }),
        );
        status.properties.insert(
            "state".to_string(),
            Value::from(if running { "running" } else { "waiting" }),
        );
        Ok(status)
    }

    fn start_condition(&self) -> Result<Condition, ControlError> {
        Ok(vec![vec!["runlevel".to_string(), "[2345]".to_string()]])
    }

    fn stop_condition(&self) -> Result<Condition, ControlError> {
        Ok(vec![vec!["runlevel".to_string(), "[!2345]".to_string()]])
    }
}

#[test]
fn log_priority_is_restored_after_temporary_change() {
    let system = FakeUpstart::new();
    let seen = with_log_priority(&system, LogPriority::Debug, |system| {
        system.log_priority().unwrap()
    })
    .unwrap();

    assert_eq!(seen, LogPriority::Debug);
    assert_eq!(system.log_priority().unwrap(), LogPriority::Message);
    assert_eq!(
        *system.priority_history.borrow(),
        vec![LogPriority::Debug, LogPriority::Message]
    );
}

#[test]
fn log_priority_is_restored_when_the_closure_panics() {
    let system = FakeUpstart::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        with_log_priority(&system, LogPriority::Debug, |_| -> u32 {
            panic!("job inspection failed");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(system.log_priority().unwrap(), LogPriority::Message);
    assert_eq!(
        *system.priority_history.borrow(),
        vec![LogPriority::Debug, LogPriority::Message]
    );
}

#[test]
fn log_priority_works_through_trait_objects() {
    let system: Box<dyn SystemControl> = Box::new(FakeUpstart::new());
    let version = with_log_priority(system.as_ref(), LogPriority::Info, |system| {
        system.version().unwrap()
    })
    .unwrap();
    assert!(version.contains("upstart"));
}

#[test]
fn list_jobs_returns_plain_names() {
    let system = FakeUpstart::new();
    assert_eq!(
        system.list_jobs().unwrap(),
        vec!["cron", "smbd", "network_2dinterface"]
    );
}

#[test]
fn emit_sends_assignments() {
    let system = FakeUpstart::new();
    system
        .emit(&EmitRequest::new("foo").with_env("aa", 55))
        .unwrap();
    system
        .emit(&EmitRequest::new("bar").no_wait())
        .unwrap();

    assert_eq!(
        *system.emitted.borrow(),
        vec![
            ("foo".to_string(), vec!["aa=55".to_string()], true),
            ("bar".to_string(), Vec::new(), false),
        ]
    );
}

#[test]
fn job_lifecycle() {
    let job = FakeJob::new("dustin2").unwrap();
    assert_eq!(job.status().unwrap().state(), Some("waiting"));

    job.start().unwrap();
    assert_eq!(job.status().unwrap().goal(), Some("start"));
    assert!(matches!(job.start(), Err(ControlError::Rejected(_))));

    job.restart().unwrap();
    assert_eq!(*job.starts.borrow(), 2);

    job.stop().unwrap();
    assert_eq!(job.status().unwrap().state(), Some("waiting"));
    assert_eq!(job.start_condition().unwrap()[0][1], "[2345]");
    assert_eq!(job.stop_condition().unwrap()[0][1], "[!2345]");
    assert_eq!(job.name(), "dustin2");
}

#[test]
fn job_paths() {
    assert!(matches!(
        FakeJob::new("/etc/init/dustin2"),
        Err(ControlError::InvalidJobName(_))
    ));
    assert_eq!(
        default_instance_path("my.job").unwrap(),
        "/com/ubuntu/Upstart/jobs/my_2ejob/_"
    );
}
