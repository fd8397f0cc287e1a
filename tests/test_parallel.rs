//! Test suite for region lifecycle: team sizing, identity and teardown

mod common;

use parteam::{
    current_logical_id, default_team_size, is_inside_team, parallel, parallel_with, team::registry,
    team_size, ExceptionModel, ParallelMode, Region, TeamConfig, TeamError,
};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

#[test]
fn test_region_runs_default_team_size_times() {
    let _settings = common::exclusive_settings();
    let runs = AtomicUsize::new(0);

    parallel(|| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), default_team_size());
}

#[test]
fn test_team_size_change_affects_execution() {
    let _settings = common::exclusive_settings();
    let threads = Mutex::new(HashSet::new());

    parteam::set_team_size(3);
    assert_eq!(team_size(), 3);
    parallel(|| {
        threads.lock().unwrap().insert(thread::current().id());
        Ok(())
    })
    .unwrap();
    assert_eq!(threads.lock().unwrap().len(), 3);

    threads.lock().unwrap().clear();
    parteam::set_team_size(6);
    parallel(|| {
        threads.lock().unwrap().insert(thread::current().id());
        Ok(())
    })
    .unwrap();
    assert_eq!(threads.lock().unwrap().len(), 6);
}

#[test]
fn test_team_size_preserved_between_regions() {
    let _settings = common::exclusive_settings();
    let team = default_team_size() + 1;
    let checks = Mutex::new(Vec::new());
    parteam::set_team_size(team);

    for _ in 0..2 {
        parallel(|| {
            checks.lock().unwrap().push(current_logical_id());
            Ok(())
        })
        .unwrap();
    }

    assert_eq!(checks.lock().unwrap().len(), team * 2);
}

#[test]
fn test_non_positive_team_size_restores_default() {
    let _settings = common::exclusive_settings();
    parteam::set_team_size(5);
    assert_eq!(team_size(), 5);

    parteam::set_team_size(0);
    assert_eq!(team_size(), default_team_size());
}

#[test]
fn test_serial_mode_runs_one_worker() {
    let _settings = common::exclusive_settings();
    parteam::set_team_size(2);

    let concurrent = Mutex::new(HashSet::new());
    parallel_with(ParallelMode::Concurrent, || {
        concurrent.lock().unwrap().insert(thread::current().id());
        Ok(())
    })
    .unwrap();
    assert_eq!(concurrent.lock().unwrap().len(), 2);

    let serial = Mutex::new(HashSet::new());
    parallel_with(ParallelMode::Serial, || {
        assert_eq!(team_size(), 1);
        serial.lock().unwrap().insert(thread::current().id());
        Ok(())
    })
    .unwrap();
    assert_eq!(serial.lock().unwrap().len(), 1);
}

#[test]
fn test_logical_ids_are_unique_and_dense() {
    let team = 7;
    let ids = Mutex::new(HashMap::new());

    Region::new()
        .team_size(team)
        .run(|| {
            let previous = ids
                .lock()
                .unwrap()
                .insert(current_logical_id(), thread::current().id());
            assert!(previous.is_none());
            assert_eq!(team_size(), team);
            Ok(())
        })
        .unwrap();

    let ids = ids.into_inner().unwrap();
    let mut logical: Vec<usize> = ids.keys().copied().collect();
    logical.sort_unstable();
    assert_eq!(logical, (0..team).collect::<Vec<_>>());
    assert_eq!(ids.values().collect::<HashSet<_>>().len(), team);
}

#[test]
fn test_worker_threads_are_named() {
    let names = Mutex::new(Vec::new());

    Region::new()
        .team_size(2)
        .run(|| {
            let name = thread::current().name().map(str::to_string);
            names.lock().unwrap().push((current_logical_id(), name));
            Ok(())
        })
        .unwrap();

    for (logical_id, name) in names.into_inner().unwrap() {
        assert!(name.unwrap().ends_with(&format!("-{}", logical_id)));
    }
}

#[test]
fn test_inside_team_only_within_region() {
    let inside = AtomicBool::new(false);
    assert!(!is_inside_team());
    assert_eq!(current_logical_id(), 0);

    Region::new()
        .team_size(1)
        .run(|| {
            inside.store(is_inside_team(), Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert!(inside.load(Ordering::SeqCst));
    assert!(!is_inside_team());
}

#[test]
fn test_team_size_fixed_for_region_lifetime() {
    let _settings = common::exclusive_settings();
    parteam::set_team_size(3);
    let sizes = Mutex::new(Vec::new());

    parallel(|| {
        parteam::single(|| parteam::set_team_size(8))?;
        sizes.lock().unwrap().push(team_size());
        Ok(())
    })
    .unwrap();

    assert_eq!(sizes.into_inner().unwrap(), vec![3, 3, 3]);
    assert_eq!(team_size(), 8);
}

#[test]
fn test_workers_unbound_after_region() {
    let workers = Mutex::new(Vec::<ThreadId>::new());

    Region::new()
        .team_size(4)
        .run(|| {
            workers.lock().unwrap().push(thread::current().id());
            Ok(())
        })
        .unwrap();

    let workers = workers.into_inner().unwrap();
    assert_eq!(workers.len(), 4);
    assert!(workers.iter().all(|id| !registry().is_bound(*id)));
}

#[test]
fn test_zero_team_override_rejected() {
    let ran = AtomicBool::new(false);
    let err = Region::new()
        .team_size(0)
        .run(|| {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, TeamError::InvalidArgument { .. }));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn test_nested_region_keeps_outer_binding() {
    let inner_runs = AtomicUsize::new(0);
    let outer_sizes = Mutex::new(Vec::new());

    Region::new()
        .team_size(2)
        .exception_model(ExceptionModel::Propagate)
        .run(|| {
            Region::new().team_size(3).run(|| {
                assert_eq!(team_size(), 3);
                inner_runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })?;
            // Back on the outer team.
            outer_sizes.lock().unwrap().push(team_size());
            parteam::barrier()?;
            Ok(())
        })
        .unwrap();

    assert_eq!(inner_runs.load(Ordering::SeqCst), 6);
    assert_eq!(outer_sizes.into_inner().unwrap(), vec![2, 2]);
}

#[test]
fn test_sequential_regions_do_not_share_construct_state() {
    let team = 4;
    let appended = Mutex::new(Vec::new());
    let singles = AtomicUsize::new(0);
    let sections = AtomicUsize::new(0);

    for region in 0..2 {
        Region::new()
            .team_size(team)
            .exception_model(ExceptionModel::Propagate)
            .run(|| {
                appended.lock().unwrap().push(region);
                parteam::single(|| {
                    singles.fetch_add(1, Ordering::SeqCst);
                })?;
                parteam::critical(|| appended.lock().unwrap().push(region))?;
                parteam::sections![{
                    sections.fetch_add(1, Ordering::SeqCst);
                }]?;
                Ok(())
            })
            .unwrap();
    }

    let appended = appended.into_inner().unwrap();
    assert_eq!(appended.len(), 2 * team * 2);
    assert_eq!(appended.iter().filter(|r| **r == 0).count(), team * 2);
    assert_eq!(singles.load(Ordering::SeqCst), 2);
    assert_eq!(sections.load(Ordering::SeqCst), 2);
}

#[test]
fn test_configure_replaces_settings() {
    let _settings = common::exclusive_settings();
    let config = TeamConfig::builder()
        .team_size(2)
        .thread_name_prefix("configured")
        .build()
        .unwrap();
    parteam::configure(config.clone()).unwrap();
    assert_eq!(parteam::settings(), config);

    let names = Mutex::new(Vec::new());
    parallel(|| {
        names
            .lock()
            .unwrap()
            .push(thread::current().name().unwrap_or_default().to_string());
        Ok(())
    })
    .unwrap();
    assert!(names.into_inner().unwrap().iter().all(|n| n.starts_with("configured-")));

    let invalid = TeamConfig {
        team_size: 0,
        ..TeamConfig::default()
    };
    assert!(parteam::configure(invalid).is_err());

    parteam::configure(TeamConfig::default()).unwrap();
}
