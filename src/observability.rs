use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("chatting.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("chatting.client.request_errors");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("chatting.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("chatting.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("chatting.stream.bytes");
pub(crate) static STREAM_INTERRUPTS: Counter = Counter::new("chatting.stream.interrupts");
pub(crate) static STREAM_TTFB: Moments = Moments::new("chatting.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("chatting.stream.duration_seconds");

pub(crate) static TRANSCRIPT_SAVES: Counter = Counter::new("chatting.transcript.saves");
pub(crate) static TRANSCRIPT_SAVE_ERRORS: Counter =
    Counter::new("chatting.transcript.save_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_INTERRUPTS);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&TRANSCRIPT_SAVES);
    collector.register_counter(&TRANSCRIPT_SAVE_ERRORS);
}
