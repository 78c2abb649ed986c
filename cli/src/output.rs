use anyhow::Result;
use fleetbench_bench::{CheckReport, MemberTiming, ReadReport, WriteReport};
use fleetbench_common::FleetDescription;
use serde::Serialize;
use std::collections::HashMap;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_description(description: &FleetDescription, json: bool) -> Result<()> {
    if json {
        return print_json(description.entries());
    }
    for entry in description.entries() {
        println!("{:<12} {}  {}", entry.node, entry.id, entry.address);
    }
    Ok(())
}

pub fn print_read(report: &ReadReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!("read {} from {}", report.cid, report.node);
    print_timings(&report.timings);
    println!("total {:.2} ms", report.total.as_secs_f64() * 1000.0);
    Ok(())
}

pub fn print_write(report: &WriteReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "wrote {} to {} as {}",
        report.filename,
        report.node,
        report.cid.as_deref().unwrap_or("<none>")
    );
    print_timings(&report.timings);
    println!("total {:.2} ms", report.total.as_secs_f64() * 1000.0);
    Ok(())
}

pub fn print_check(report: &CheckReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "{}: {} of {} members answered",
        report.node,
        report.healthy(),
        report.timings.len()
    );
    print_timings(&report.timings);
    let mut ids: Vec<&String> = report.peer_ids.keys().collect();
    ids.sort();
    for id in ids {
        println!("  {}  peer {}", id, report.peer_ids[id]);
    }
    Ok(())
}

fn print_timings(timings: &HashMap<String, MemberTiming>) {
    let mut ids: Vec<&String> = timings.keys().collect();
    ids.sort();
    for id in ids {
        let timing = &timings[id];
        let ms = timing.elapsed.as_secs_f64() * 1000.0;
        match &timing.error {
            None => println!("  {}  {:>10.2} ms", id, ms),
            Some(error) => println!("  {}  {:>10.2} ms  FAILED: {}", id, ms, error),
        }
    }
}
