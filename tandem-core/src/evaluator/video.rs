//! Rolling frame buffers for evaluation videos.
use std::collections::VecDeque;

/// One fixed-capacity frame buffer per tracked environment.
///
/// When a buffer is full the oldest frame is evicted.
#[derive(Clone, Debug)]
pub struct VideoBuffer<F> {
    windows: Vec<VecDeque<F>>,
    capacity: usize,
}

impl<F: Clone> VideoBuffer<F> {
    /// Buffers for `n_windows` environments holding at most `capacity` frames each.
    pub fn new(n_windows: usize, capacity: usize) -> Self {
        Self {
            windows: (0..n_windows)
                .map(|_| VecDeque::with_capacity(capacity))
                .collect(),
            capacity,
        }
    }

    /// Number of tracked environments.
    pub fn n_windows(&self) -> usize {
        self.windows.len()
    }

    /// Appends a frame to the buffer of one environment.
    pub fn push(&mut self, window: usize, frame: F) {
        if self.capacity == 0 {
            return;
        }
        if let Some(w) = self.windows.get_mut(window) {
            if w.len() == self.capacity {
                w.pop_front();
            }
            w.push_back(frame);
        }
    }

    /// Appends the frames of all environments; frames beyond the tracked
    /// environments are dropped.
    pub fn push_all(&mut self, frames: Vec<F>) {
        for (i, frame) in frames.into_iter().enumerate().take(self.windows.len()) {
            self.push(i, frame);
        }
    }

    /// Number of frames held per environment.
    pub fn lens(&self) -> Vec<usize> {
        self.windows.iter().map(|w| w.len()).collect()
    }

    /// Returns the frames, padding shorter buffers to the longest one by
    /// repeating their last frame.
    pub fn into_padded(self) -> Vec<Vec<F>> {
        let max_len = self.windows.iter().map(|w| w.len()).max().unwrap_or(0);
        self.windows
            .into_iter()
            .map(|w| {
                let mut frames: Vec<F> = w.into_iter().collect();
                if let Some(last) = frames.last().cloned() {
                    frames.resize(max_len, last);
                }
                frames
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_repeats_last_frame() {
        let mut video = VideoBuffer::new(3, 10);
        for t in 0..5 {
            video.push(0, (0, t));
        }
        for w in 1..3 {
            for t in 0..3 {
                video.push(w, (w, t));
            }
        }
        assert_eq!(video.lens(), vec![5, 3, 3]);

        let frames = video.into_padded();
        assert!(frames.iter().all(|f| f.len() == 5));
        assert_eq!(frames[0][4], (0, 4));
        assert_eq!(frames[1][2..], [(1, 2), (1, 2), (1, 2)]);
        assert_eq!(frames[2][2..], [(2, 2), (2, 2), (2, 2)]);
    }

    #[test]
    fn test_oldest_frames_are_evicted() {
        let mut video = VideoBuffer::new(2, 2);
        video.push_all(vec![1, 10, 100]);
        video.push_all(vec![2, 20, 200]);
        video.push_all(vec![3, 30, 300]);
        assert_eq!(video.n_windows(), 2);
        assert_eq!(video.into_padded(), vec![vec![2, 3], vec![20, 30]]);
    }
}
