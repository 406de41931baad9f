//! Hosts one ParityEngine on a dedicated thread behind request/response
//! channels, so a full-chart recompute never blocks the caller. The engine
//! itself is synchronous and processes one request at a time; callers
//! correlate responses by the id they assigned.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::{info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::engine::cost::WeightTable;
use crate::engine::note::NoteEntry;
use crate::engine::{ComputeOutput, DebugSnapshot, ParityEngine};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Init { id: u64, game_type: String },
    #[serde(rename_all = "camelCase")]
    Compute {
        id: u64,
        start_beat: f32,
        end_beat: f32,
        notedata: Vec<NoteEntry>,
        #[serde(default)]
        debug: bool,
    },
    #[serde(rename_all = "camelCase")]
    GetDebug { id: u64 },
}

impl Request {
    pub fn id(&self) -> u64 {
        match self {
            Request::Init { id, .. } | Request::Compute { id, .. } | Request::GetDebug { id } => {
                *id
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    #[serde(rename_all = "camelCase")]
    Init { game_type: String, columns: usize },
    Compute(Box<ComputeOutput>),
    Debug(Box<DebugSnapshot>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResponsePayload>,
}

impl Response {
    fn success(id: u64, result: ResponsePayload) -> Self {
        Response {
            id,
            ok: true,
            error: None,
            result: Some(result),
        }
    }

    pub fn failure(id: u64, error: String) -> Self {
        Response {
            id,
            ok: false,
            error: Some(error),
            result: None,
        }
    }
}

pub struct WorkerHandle {
    pub tx: Sender<Request>,
    pub rx: Receiver<Response>,
}

/// Spawns the engine thread. The thread exits when the request sender is
/// dropped; in-flight requests then simply never get a response, which the
/// caller surfaces as a transport failure.
pub fn spawn(weights: WeightTable) -> WorkerHandle {
    let (req_tx, req_rx) = mpsc::channel::<Request>();
    let (resp_tx, resp_rx) = mpsc::channel::<Response>();
    thread::spawn(move || run(req_rx, resp_tx, weights));
    WorkerHandle {
        tx: req_tx,
        rx: resp_rx,
    }
}

fn run(rx: Receiver<Request>, tx: Sender<Response>, weights: WeightTable) {
    info!("parity worker started");
    let mut engine: Option<ParityEngine> = None;
    while let Ok(request) = rx.recv() {
        trace!("handling request {}", request.id());
        let response = handle(&mut engine, request, weights);
        if tx.send(response).is_err() {
            break;
        }
    }
    info!("parity worker shutting down");
}

fn handle(engine: &mut Option<ParityEngine>, request: Request, weights: WeightTable) -> Response {
    match request {
        Request::Init { id, game_type } => match ParityEngine::new(&game_type, weights) {
            Ok(new_engine) => {
                let payload = ResponsePayload::Init {
                    game_type: new_engine.game_type().to_string(),
                    columns: new_engine.columns(),
                };
                *engine = Some(new_engine);
                Response::success(id, payload)
            }
            Err(err) => {
                warn!("init failed: {err}");
                *engine = None;
                Response::failure(id, err.to_string())
            }
        },
        Request::Compute {
            id,
            start_beat,
            end_beat,
            notedata,
            debug,
        } => match engine.as_mut() {
            None => Response::failure(id, "engine not initialized; call init first".to_string()),
            Some(engine) => match engine.compute(start_beat, end_beat, &notedata, debug) {
                Ok(output) => Response::success(id, ResponsePayload::Compute(Box::new(output))),
                Err(err) => Response::failure(id, err.to_string()),
            },
        },
        Request::GetDebug { id } => match engine.as_ref() {
            None => Response::failure(id, "engine not initialized; call init first".to_string()),
            Some(engine) => {
                Response::success(id, ResponsePayload::Debug(Box::new(engine.debug_snapshot())))
            }
        },
    }
}
