//! Hosts the parity worker behind newline-delimited JSON on stdin/stdout:
//! one request per line in, one response per line out, correlated by id.
//! Also provides a one-shot `--compute <chart.json>` mode for inspection.

use std::error::Error;
use std::fs;
use std::io::{self, BufRead, Write};
use std::thread;

use log::{error, info};
use serde::Deserialize;

use crate::config;
use crate::engine::note::NoteEntry;
use crate::engine::ParityEngine;
use crate::worker::{self, Request, Response, WorkerHandle};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartFile {
    game_type: String,
    notedata: Vec<NoteEntry>,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().position(|a| a == "--compute") {
        let path = args
            .get(pos + 1)
            .ok_or("usage: padparity --compute <chart.json>")?;
        return compute_once(path);
    }
    serve()
}

/// Loads a chart file, resolves the whole thing in one pass and pretty-prints
/// the result with the debug payload attached.
fn compute_once(path: &str) -> Result<(), Box<dyn Error>> {
    let raw = fs::read_to_string(path)?;
    let chart: ChartFile = serde_json::from_str(&raw)?;
    let mut engine = ParityEngine::new(&chart.game_type, config::get().weights)?;
    let end_beat = chart
        .notedata
        .iter()
        .map(|n| n.beat + n.hold_length.unwrap_or(0.0))
        .fold(0.0f32, f32::max);
    let output = engine.compute(0.0, end_beat, &chart.notedata, true)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn serve() -> Result<(), Box<dyn Error>> {
    let WorkerHandle { tx, rx } = worker::spawn(config::get().weights);

    let printer = thread::spawn(move || {
        while let Ok(response) = rx.recv() {
            match serde_json::to_string(&response) {
                Ok(line) => write_line(&line),
                Err(err) => error!("failed to serialize response {}: {err}", response.id),
            }
        }
    });

    info!("serving parity requests on stdin/stdout");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                if tx.send(request).is_err() {
                    break;
                }
            }
            Err(err) => {
                let id = request_id_of(&line);
                let response = Response::failure(id, format!("bad request: {err}"));
                match serde_json::to_string(&response) {
                    Ok(out) => write_line(&out),
                    Err(err) => error!("failed to serialize error response: {err}"),
                }
            }
        }
    }

    drop(tx);
    let _ = printer.join();
    Ok(())
}

#[inline(always)]
fn write_line(line: &str) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

/// Best-effort id recovery from a request that failed to parse, so the
/// caller can still match the failure to its pending entry.
fn request_id_of(line: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id")?.as_u64())
        .unwrap_or(0)
}
