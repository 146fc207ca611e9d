//! Control handshake performed once before playback starts.
//!
//! Each step degrades gracefully: a producer without a control surface still
//! streams, so failures are logged and the local configuration is kept.

use tc_control::{ConfigRequest, ControlApi};
use tc_core::Rhythm;
use tc_core::config::TuningConfig;
use tracing::{info, warn};

/// What the handshake established.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// Build reported by the producer, used to flag bundles from another build.
    pub build_id: Option<String>,
    /// Lead rhythm to trigger with: the producer's echo, else the local value.
    pub rhythm: Rhythm,
    pub reset: bool,
}

pub async fn handshake(api: &dyn ControlApi, tuning: &TuningConfig) -> Handshake {
    let build_id = match api.build_info().await {
        Ok(b) => Some(b.build_id),
        Err(e) => {
            warn!("[startup] build identity unavailable: {e:#}");
            None
        }
    };

    let local_rhythm = Rhythm::from_steps(tuning.soprano_rhythm).unwrap_or_default();
    let rhythm = match ConfigRequest::from_tuning(tuning) {
        Ok(request) => match api.apply_config(&request).await {
            Ok(applied) => match applied.rhythm() {
                Some(rhythm) => rhythm,
                None => {
                    let echoed = applied.soprano_rhythm;
                    warn!(
                        "[startup] unknown echoed rhythm {echoed}, keeping {local_rhythm:?}"
                    );
                    local_rhythm
                }
            },
            Err(e) => {
                warn!("[startup] config not applied: {e:#}");
                local_rhythm
            }
        },
        Err(e) => {
            warn!("[startup] {e}");
            local_rhythm
        }
    };

    let reset = match api.reset().await {
        Ok(()) => true,
        Err(e) => {
            warn!("[startup] reset failed: {e:#}");
            false
        }
    };

    info!("[startup] build={build_id:?} lead={rhythm:?} reset={reset}");
    Handshake {
        build_id,
        rhythm,
        reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tc_control::{BuildInfo, ConfigResponse};

    struct FakeControl {
        echo_rhythm: Option<u8>,
        calls: Mutex<Vec<&'static str>>,
    }

    fn fake(echo_rhythm: Option<u8>) -> FakeControl {
        FakeControl {
            echo_rhythm,
            calls: Mutex::default(),
        }
    }

    #[async_trait]
    impl ControlApi for FakeControl {
        async fn build_info(&self) -> Result<BuildInfo> {
            self.calls.lock().unwrap().push("build");
            Ok(BuildInfo {
                build_id: "B7".into(),
                server_path: None,
                server_time: None,
            })
        }

        async fn apply_config(&self, request: &ConfigRequest) -> Result<ConfigResponse> {
            self.calls.lock().unwrap().push("config");
            let echo = self.echo_rhythm.ok_or_else(|| anyhow!("404"))?;
            Ok(ConfigResponse {
                sensitivity: request.sensitivity,
                qqq_step_pct: None,
                spy_step_pct: None,
                price_noise: request.price_noise,
                soprano_rhythm: echo,
            })
        }

        async fn reset(&self) -> Result<()> {
            self.calls.lock().unwrap().push("reset");
            Err(anyhow!("404"))
        }
    }

    #[tokio::test]
    async fn echoed_rhythm_wins() {
        let api = fake(Some(8));
        let hs = handshake(&api, &TuningConfig::default()).await;
        assert_eq!(hs.rhythm, Rhythm::Eighth);
        assert_eq!(hs.build_id.as_deref(), Some("B7"));
        assert!(!hs.reset);
        assert_eq!(*api.calls.lock().unwrap(), vec!["build", "config", "reset"]);
    }

    #[tokio::test]
    async fn config_failure_keeps_local_rhythm() {
        let api = fake(None);
        let tuning = TuningConfig {
            soprano_rhythm: 4,
            ..TuningConfig::default()
        };
        assert_eq!(handshake(&api, &tuning).await.rhythm, Rhythm::Quarter);
    }
}
