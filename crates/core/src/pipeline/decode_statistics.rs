use serde::Serialize;

/// Running totals over one decoding session.
///
/// Only the session's collecting thread mutates these, so no locking is
/// involved even when utterances are decoded in parallel.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DecodeStatistics {
    /// Sum of best-path log-likelihoods over successful utterances.
    pub total_log_likelihood: f64,
    /// Frames in successful utterances.
    pub total_frames: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Successes that never reached a final state.
    pub partial_count: usize,
    /// True when the run stopped before the source was exhausted.
    pub interrupted: bool,
}

impl DecodeStatistics {
    pub fn record_success(&mut self, num_frames: usize, log_likelihood: f64, partial: bool) {
        self.success_count += 1;
        self.total_frames += num_frames;
        self.total_log_likelihood += log_likelihood;
        if partial {
            self.partial_count += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// `None` when no frame was decoded successfully.
    pub fn average_log_likelihood_per_frame(&self) -> Option<f64> {
        (self.total_frames > 0).then(|| self.total_log_likelihood / self.total_frames as f64)
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "Done {} utterances, failed for {}",
            self.success_count, self.failure_count
        );
        if self.partial_count > 0 {
            text.push_str(&format!(" ({} partial)", self.partial_count));
        }
        match self.average_log_likelihood_per_frame() {
            Some(avg) => text.push_str(&format!(
                "; average log-likelihood per frame {avg:.4} over {} frames",
                self.total_frames
            )),
            None => text.push_str("; no frames decoded"),
        }
        if self.interrupted {
            text.push_str("; run interrupted");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accumulates_successes_and_failures() {
        let mut stats = DecodeStatistics::default();
        stats.record_success(10, -20.0, false);
        stats.record_success(30, -40.0, true);
        stats.record_failure();

        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.partial_count, 1);
        assert_eq!(stats.total_frames, 40);
        assert_eq!(stats.processed(), 3);
        assert_relative_eq!(stats.average_log_likelihood_per_frame().unwrap(), -1.5);
    }

    #[test]
    fn test_no_frames_has_no_average() {
        let mut stats = DecodeStatistics::default();
        stats.record_failure();
        assert!(stats.average_log_likelihood_per_frame().is_none());
        assert!(stats.summary().contains("no frames decoded"));
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut stats = DecodeStatistics::default();
        stats.record_success(4, -2.0, true);
        stats.interrupted = true;
        let text = stats.summary();
        assert!(text.starts_with("Done 1 utterances, failed for 0 (1 partial)"));
        assert!(text.contains("-0.5000 over 4 frames"));
        assert!(text.ends_with("run interrupted"));
    }
}
