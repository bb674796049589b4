use rollcall_core::{AttendanceError, AttendanceService, Granularity, Recipient, Signature};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceInterface {
    service: Arc<AttendanceService>,
    persistent: bool,
}

impl AttendanceInterface {
    pub fn new(service: Arc<AttendanceService>, persistent: bool) -> Self {
        Self {
            service,
            persistent,
        }
    }

    /// Run a service call off the async executor; the SQLite journal blocks.
    async fn call<T, F>(&self, f: F) -> zbus::fdo::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&AttendanceService) -> Result<T, AttendanceError> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || f(&service))
            .await
            .map_err(|e| zbus::fdo::Error::Failed(format!("worker task failed: {e}")))?
            .map_err(to_fdo)
    }
}

/// Map core errors onto D-Bus error names callers can branch on.
fn to_fdo(err: AttendanceError) -> zbus::fdo::Error {
    let msg = err.to_string();
    match err {
        AttendanceError::NoFaceDetected
        | AttendanceError::InvalidInput(_)
        | AttendanceError::Decode(_) => zbus::fdo::Error::InvalidArgs(msg),
        AttendanceError::EmptyRoster => zbus::fdo::Error::Failed(msg),
        AttendanceError::UnknownIdentity(_) => zbus::fdo::Error::UnknownObject(msg),
        AttendanceError::Journal(_) => zbus::fdo::Error::IOError(msg),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(format!("encoding reply: {e}")))
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceInterface {
    /// Register a person from an extracted signature. An empty signature
    /// means the extractor found no face in the photo.
    async fn register_identity(&self, name: String, signature: Vec<f64>) -> zbus::fdo::Result<u64> {
        tracing::info!(name = %name, dimension = signature.len(), "register requested");
        let signature = (!signature.is_empty()).then(|| Signature::new(signature));
        self.call(move |service| service.register_identity(&name, signature))
            .await
    }

    /// Mark today's attendance from the signatures found in one frame.
    /// Returns `{"date", "present": [name], "absent": [name], ...}` as JSON.
    async fn take_attendance(&self, signatures: Vec<Vec<f64>>) -> zbus::fdo::Result<String> {
        tracing::info!(faces = signatures.len(), "attendance requested");
        let frame: Vec<Signature> = signatures.into_iter().map(Signature::new).collect();
        let today = chrono::Local::now().date_naive();
        let sheet = self
            .call(move |service| service.take_attendance(&frame, today))
            .await?;
        to_json(&sheet)
    }

    /// List registered identities as a JSON array of `{id, name}`.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        to_json(&self.service.list_identities())
    }

    /// Present/absent counts for charting; `granularity` is "daily" or "monthly".
    async fn get_series(&self, identity_id: u64, granularity: String) -> zbus::fdo::Result<String> {
        let granularity = Granularity::parse(&granularity);
        let buckets = self
            .service
            .series(identity_id, granularity)
            .map_err(to_fdo)?;
        to_json(&buckets)
    }

    /// Totals, percentage and full history for one identity.
    async fn get_summary_report(&self, identity_id: u64, recipient: String) -> zbus::fdo::Result<String> {
        let report = self
            .service
            .summary_report(identity_id, Recipient::parse(&recipient))
            .map_err(to_fdo)?;
        to_json(&report)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let settings = self.service.settings();
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": self.service.identity_count(),
            "signature_dimension": self.service.signature_dimension(),
            "tolerance": settings.tolerance,
            "match_policy": settings.match_policy,
            "absent_policy": settings.absent_policy,
            "persistent": self.persistent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{JournalError, Settings};

    fn interface() -> AttendanceInterface {
        AttendanceInterface::new(Arc::new(AttendanceService::new(Settings::default())), false)
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(to_fdo(AttendanceError::NoFaceDetected), zbus::fdo::Error::InvalidArgs(_)));
        assert!(matches!(to_fdo(AttendanceError::Decode("x".into())), zbus::fdo::Error::InvalidArgs(_)));
        assert!(matches!(to_fdo(AttendanceError::EmptyRoster), zbus::fdo::Error::Failed(_)));
        assert!(matches!(
            to_fdo(AttendanceError::UnknownIdentity(3)),
            zbus::fdo::Error::UnknownObject(_)
        ));
        assert!(matches!(
            to_fdo(AttendanceError::Journal(JournalError::new("disk"))),
            zbus::fdo::Error::IOError(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_signature_is_no_face() {
        let iface = interface();
        let err = iface.register_identity("Ada".into(), vec![]).await.unwrap_err();
        match err {
            zbus::fdo::Error::InvalidArgs(msg) => assert!(msg.contains("no face detected")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_then_take_attendance() {
        let iface = interface();
        let id = iface.register_identity("Ada".into(), vec![0.0, 0.0]).await.unwrap();
        iface.register_identity("Bo".into(), vec![2.0, 0.0]).await.unwrap();

        let sheet: serde_json::Value =
            serde_json::from_str(&iface.take_attendance(vec![vec![0.1, 0.0]]).await.unwrap()).unwrap();
        assert_eq!(sheet["present"], serde_json::json!(["Ada"]));
        assert_eq!(sheet["absent"], serde_json::json!(["Bo"]));

        let series: serde_json::Value =
            serde_json::from_str(&iface.get_series(id, "daily".into()).await.unwrap()).unwrap();
        assert_eq!(series[0]["present"], 1);

        let listed: serde_json::Value =
            serde_json::from_str(&iface.list_identities().await.unwrap()).unwrap();
        assert_eq!(listed[1]["name"], "Bo");
    }

    #[tokio::test]
    async fn test_take_attendance_without_roster() {
        let err = interface().take_attendance(vec![]).await.unwrap_err();
        assert!(matches!(err, zbus::fdo::Error::Failed(_)));
    }

    #[tokio::test]
    async fn test_report_for_unknown_identity() {
        let err = interface()
            .get_summary_report(99, "parent".into())
            .await
            .unwrap_err();
        assert!(matches!(err, zbus::fdo::Error::UnknownObject(_)));
    }

    #[tokio::test]
    async fn test_status_reports_settings() {
        let status: serde_json::Value =
            serde_json::from_str(&interface().status().await.unwrap()).unwrap();
        assert_eq!(status["identities"], 0);
        assert_eq!(status["match_policy"], "first");
        assert_eq!(status["absent_policy"], "append");
        assert_eq!(status["persistent"], false);
    }
}
