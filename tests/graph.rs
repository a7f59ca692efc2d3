mod common;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use common::wait_until;
use mic_capture_rs::{
    AudioContext, AudioContextOptions, AudioNode, MediaStream, MediaStreamSourceNode,
    MediaStreamTrack, SampleBlock, StreamSettings,
};
use tracing_test::traced_test;

/// Counts the frames it is handed.
#[derive(Default)]
struct FrameCounter {
    frames: AtomicUsize,
    last: Mutex<Option<SampleBlock>>,
}

impl AudioNode for FrameCounter {
    fn process(&self, input: &SampleBlock, _current_time: f64) {
        self.frames.fetch_add(input.frames(), Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(input.clone());
    }
}

#[test]
#[traced_test]
fn custom_nodes_receive_source_quanta() {
    let ctx = Arc::new(AudioContext::new(AudioContextOptions::default()));
    let (sender, receiver) = crossbeam_channel::unbounded();
    let track = MediaStreamTrack::new("test input");
    let stream = MediaStream::new(
        vec![track.clone()],
        StreamSettings {
            sample_rate: 48_000,
            channel_count: 1,
        },
        receiver,
    );

    let source = MediaStreamSourceNode::new(&ctx, &stream).unwrap();
    let counter = Arc::new(FrameCounter::default());
    let node = ctx.add_node(Arc::clone(&counter) as Arc<dyn AudioNode>);
    ctx.connect(source.id(), node).unwrap();
    ctx.connect(node, ctx.destination()).unwrap();

    sender.send(vec![0.5; 300]).unwrap();
    wait_until("two quanta", || counter.frames.load(Ordering::SeqCst) == 256);
    let last = counter.last.lock().unwrap().clone().unwrap();
    assert_eq!(last.channel(0), Some(&[0.5; 128][..]));

    track.stop();
    ctx.remove_node(node);
    source.release(&ctx);
    assert_eq!(ctx.node_count(), 0);
    assert_eq!(ctx.connection_count(), 0);
}

#[test]
#[traced_test]
fn unwired_custom_nodes_stay_idle() {
    let ctx = Arc::new(AudioContext::new(AudioContextOptions::default()));
    let (sender, receiver) = crossbeam_channel::unbounded();
    let track = MediaStreamTrack::new("test input");
    let stream = MediaStream::new(
        vec![track.clone()],
        StreamSettings {
            sample_rate: 48_000,
            channel_count: 1,
        },
        receiver,
    );

    let source = MediaStreamSourceNode::new(&ctx, &stream).unwrap();
    let wired = Arc::new(FrameCounter::default());
    let dangling = Arc::new(FrameCounter::default());
    let wired_id = ctx.add_node(Arc::clone(&wired) as Arc<dyn AudioNode>);
    let dangling_id = ctx.add_node(Arc::clone(&dangling) as Arc<dyn AudioNode>);
    ctx.connect(source.id(), wired_id).unwrap();
    ctx.connect(source.id(), dangling_id).unwrap();
    ctx.connect(wired_id, ctx.destination()).unwrap();

    sender.send(vec![0.0; 128]).unwrap();
    wait_until("one quantum", || wired.frames.load(Ordering::SeqCst) == 128);
    assert_eq!(dangling.frames.load(Ordering::SeqCst), 0);

    track.stop();
}
