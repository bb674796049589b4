//! End-to-end attendance flow through the service API, including
//! concurrent registration and attendance runs.

use chrono::NaiveDate;
use rollcall_core::{
    AttendanceService, AttendanceStatus, Granularity, Recipient, Settings, Signature,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn signature_for(i: usize) -> Signature {
    // Points spaced 10 apart on one axis never fall within tolerance of each other.
    Signature::new(vec![i as f64 * 10.0, 0.0, 0.0])
}

#[test]
fn test_classroom_week() {
    let service = AttendanceService::new(Settings::default());
    let ids: Vec<u64> = ["Ada", "Bo", "Cy"]
        .iter()
        .enumerate()
        .map(|(i, name)| service.register_identity(name, Some(signature_for(i))).unwrap())
        .collect();

    // Ada every day, Bo twice, Cy never; Bo's face appears twice in one frame.
    let frames = [
        ("2024-02-26", vec![signature_for(0), signature_for(1), signature_for(1)]),
        ("2024-02-27", vec![signature_for(0)]),
        ("2024-02-28", vec![signature_for(0), signature_for(1)]),
        ("2024-03-01", vec![signature_for(0)]),
    ];
    for (date, frame) in &frames {
        service.take_attendance(frame, day(date)).unwrap();
    }

    let bo = service.series(ids[1], Granularity::Daily).unwrap();
    assert_eq!(bo.len(), 4);
    assert_eq!((bo[0].present, bo[0].absent), (1, 0));
    assert_eq!((bo[1].present, bo[1].absent), (0, 1));

    let cy_monthly = service.series(ids[2], Granularity::Monthly).unwrap();
    let labels: Vec<&str> = cy_monthly.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["2024-02", "2024-03"]);
    assert_eq!((cy_monthly[0].present, cy_monthly[0].absent), (0, 3));

    let ada = service.summary_report(ids[0], Recipient::Parent).unwrap();
    assert_eq!(ada.summary.percentage, 100.0);
    assert!(ada.history.iter().all(|e| e.status == AttendanceStatus::Present));
}

#[test]
fn test_concurrent_registration_assigns_unique_ids() {
    let service = Arc::new(AttendanceService::new(Settings::default()));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        service
                            .register_identity(&format!("p{t}-{i}"), Some(signature_for(t * 25 + i)))
                            .unwrap()
                    })
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "id {id} assigned twice");
        }
    }
    assert_eq!(ids.len(), 200);
    assert_eq!(ids.iter().max(), Some(&200));
    assert_eq!(service.identity_count(), 200);
}

#[test]
fn test_concurrent_runs_keep_present_unique_per_day() {
    let service = Arc::new(AttendanceService::new(Settings::default()));
    let a = service.register_identity("Ada", Some(signature_for(0))).unwrap();
    let b = service.register_identity("Bo", Some(signature_for(1))).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for _ in 0..10 {
                    service
                        .take_attendance(&[signature_for(0)], day("2024-04-01"))
                        .unwrap();
                }
            })
        })
        .collect();

    // Registrations racing with attendance runs must never break a run.
    for i in 2..12 {
        service
            .register_identity(&format!("late-{i}"), Some(signature_for(i)))
            .unwrap();
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let ada = service.history(a).unwrap();
    assert_eq!(ada.len(), 1);
    assert_eq!(ada[0].status, AttendanceStatus::Present);

    let bo = service.history(b).unwrap();
    assert_eq!(bo.len(), 80);
    assert!(bo.iter().all(|e| e.status == AttendanceStatus::Absent));
}

#[test]
fn test_status_wire_names() {
    let json = serde_json::to_string(&AttendanceStatus::Present).unwrap();
    assert_eq!(json, "\"Present\"");
    let granularity: Granularity = serde_json::from_str("\"monthly\"").unwrap();
    assert_eq!(granularity, Granularity::Monthly);
}
