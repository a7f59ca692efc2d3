use crate::constants::TargetFormat;

/// One block of de-interleaved samples, one `Vec` per channel.
///
/// Every channel holds the same number of frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBlock {
    channels: Vec<Vec<TargetFormat>>,
}

impl SampleBlock {
    pub fn new(channels: Vec<Vec<TargetFormat>>) -> Self {
        debug_assert!(
            channels.windows(2).all(|pair| pair[0].len() == pair[1].len()),
            "All channels of a block must have the same length"
        );
        Self { channels }
    }

    pub fn silent(channel_count: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
        }
    }

    /// Splits interleaved `data` into `channel_count` channels. Trailing samples
    /// that do not form a full frame are dropped.
    pub fn from_interleaved(data: &[TargetFormat], channel_count: usize) -> Self {
        let channel_count = channel_count.max(1);
        let frames = data.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        for frame in data.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[TargetFormat]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<TargetFormat>] {
        &self.channels
    }

    pub fn into_channel(mut self, index: usize) -> Option<Vec<TargetFormat>> {
        if index < self.channels.len() {
            Some(self.channels.swap_remove(index))
        } else {
            None
        }
    }

    pub fn into_channels(self) -> Vec<Vec<TargetFormat>> {
        self.channels
    }
}

/// Collects render quanta until a full `buffer_size` block is available.
///
/// Input with fewer channels than `channel_count` is up-mixed: a mono input
/// is copied to every channel, anything else is padded with silence.
#[derive(Debug)]
pub(crate) struct BlockAccumulator {
    buffer_size: usize,
    pending: Vec<Vec<TargetFormat>>,
}

impl BlockAccumulator {
    pub(crate) fn new(channel_count: usize, buffer_size: usize) -> Self {
        Self {
            buffer_size,
            pending: vec![Vec::with_capacity(buffer_size); channel_count.max(1)],
        }
    }

    pub(crate) fn push(&mut self, input: &SampleBlock, mut emit: impl FnMut(SampleBlock)) {
        let frames = input.frames();
        let mono = input.channel_count() == 1;

        for (index, pending) in self.pending.iter_mut().enumerate() {
            match input.channel(index) {
                Some(samples) => pending.extend_from_slice(samples),
                None if mono => pending.extend_from_slice(&input.channels[0]),
                None => pending.resize(pending.len() + frames, 0.0),
            }
        }

        let buffer_size = self.buffer_size;
        while self.pending[0].len() >= buffer_size {
            let channels = self
                .pending
                .iter_mut()
                .map(|pending| {
                    let rest = pending.split_off(buffer_size);
                    std::mem::replace(pending, rest)
                })
                .collect();

            emit(SampleBlock::new(channels));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_interleaved_frames() {
        let block = SampleBlock::from_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0], 2);

        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.frames(), 2);
        assert_eq!(block.channel(0), Some(&[1.0, 2.0][..]));
        assert_eq!(block.channel(1), Some(&[-1.0, -2.0][..]));
    }

    #[test]
    fn accumulator_emits_full_blocks_only() {
        let mut accumulator = BlockAccumulator::new(1, 256);
        let mut emitted = Vec::new();

        for quantum in 0..5 {
            let samples = vec![quantum as f32; 128];
            accumulator.push(&SampleBlock::new(vec![samples]), |block| emitted.push(block));
        }

        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|block| block.frames() == 256));
        assert_eq!(emitted[1].channel(0).unwrap()[0], 2.0);
        assert_eq!(emitted[1].channel(0).unwrap()[255], 3.0);
    }

    #[test]
    fn accumulator_upmixes_mono_input() {
        let mut accumulator = BlockAccumulator::new(2, 256);
        let mut emitted = Vec::new();

        accumulator.push(&SampleBlock::new(vec![vec![0.5; 256]]), |block| {
            emitted.push(block)
        });

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].channel(1), Some(&[0.5; 256][..]));
    }

    #[test]
    fn accumulator_drops_extra_input_channels() {
        let mut accumulator = BlockAccumulator::new(1, 256);
        let mut emitted = Vec::new();

        let stereo = SampleBlock::new(vec![vec![1.0; 256], vec![-1.0; 256]]);
        accumulator.push(&stereo, |block| emitted.push(block));

        assert_eq!(emitted[0].channel_count(), 1);
        assert_eq!(emitted[0].channel(0), Some(&[1.0; 256][..]));
    }
}
