use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::mpsc::Sender;

use tracing::warn;

use crate::prediction::{Band, Prediction};

/// Receives lifecycle events from the pipeline and the tracker. Each call is
/// made once per prediction and event kind.
pub trait PredictionSink: Send + Sync {
    fn on_new_prediction(&self, prediction: &Prediction);
    fn on_prediction_finished(&self, prediction: &Prediction);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    New(Prediction),
    Finished(Prediction),
}

impl Notice {
    pub fn prediction(&self) -> &Prediction {
        match self {
            Notice::New(p) | Notice::Finished(p) => p,
        }
    }

    /// Key the notifier uses to group messages about the same fixture, so a
    /// result can be posted as a reply to the original announcement.
    pub fn routing_key(&self) -> &str {
        &self.prediction().key
    }

    pub fn payload(&self) -> String {
        match self {
            Notice::New(p) => announcement(p),
            Notice::Finished(p) => result_line(p),
        }
    }
}

fn band_marker(band: Band) -> &'static str {
    match band {
        Band::High => "[+]",
        Band::Medium => "[~]",
        Band::Low => "[-]",
    }
}

fn announcement(p: &Prediction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", p.league);
    let _ = writeln!(out, "{} {} | {}", p.date_str(), p.time_str(), p.teams());
    let _ = writeln!(out, "Over 2.5: {:.1}%", p.consensus_percent());
    let _ = writeln!(
        out,
        "Fair odds {:.2} | bookmaker {:.2}",
        p.fair_odds, p.bookmaker_odds
    );
    for (method, band) in p.method_bands() {
        let prob = p.estimates.get(&method).copied().unwrap_or_default();
        let _ = writeln!(
            out,
            "{} {}: {:.1}%",
            band_marker(band),
            method.label(),
            prob * 100.0
        );
    }
    out.trim_end().to_string()
}

fn result_line(p: &Prediction) -> String {
    let score = p.settled_score.as_deref().unwrap_or("?");
    let outcome = p.bet_outcome.map(|o| o.label()).unwrap_or("unknown");
    format!("Finished {}: {score} ({outcome})", p.teams())
}

/// Forwards notices to a consumer thread. A closed channel is logged and
/// otherwise ignored.
pub struct ChannelSink {
    tx: Mutex<Sender<Notice>>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Notice>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    fn send(&self, notice: Notice) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if tx.send(notice).is_err() {
            warn!("notice receiver is gone");
        }
    }
}

impl PredictionSink for ChannelSink {
    fn on_new_prediction(&self, prediction: &Prediction) {
        self.send(Notice::New(prediction.clone()));
    }

    fn on_prediction_finished(&self, prediction: &Prediction) {
        self.send(Notice::Finished(prediction.clone()));
    }
}
