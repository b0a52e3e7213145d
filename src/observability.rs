use biometrics::{Collector, Counter, Moments};

pub(crate) static PROVIDER_REQUESTS: Counter = Counter::new("colloquy.provider.requests");
pub(crate) static PROVIDER_REQUEST_ERRORS: Counter =
    Counter::new("colloquy.provider.request_errors");
pub(crate) static PROVIDER_REQUEST_DURATION: Moments =
    Moments::new("colloquy.provider.request_duration_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("colloquy.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("colloquy.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("colloquy.stream.bytes");

pub(crate) static SESSION_TURNS: Counter = Counter::new("colloquy.session.turns");
pub(crate) static SESSION_RERUNS: Counter = Counter::new("colloquy.session.reruns");
pub(crate) static SESSION_CLEARS: Counter = Counter::new("colloquy.session.clears");
pub(crate) static SESSION_INTERRUPTS: Counter = Counter::new("colloquy.session.interrupts");
pub(crate) static SESSION_ROLLBACKS: Counter = Counter::new("colloquy.session.rollbacks");
pub(crate) static SESSION_ERRORS: Counter = Counter::new("colloquy.session.errors");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("colloquy.session.turn_duration_seconds");
pub(crate) static SESSION_TURN_COST: Moments = Moments::new("colloquy.session.turn_cost_dollars");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&PROVIDER_REQUESTS);
    collector.register_counter(&PROVIDER_REQUEST_ERRORS);
    collector.register_moments(&PROVIDER_REQUEST_DURATION);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_RERUNS);
    collector.register_counter(&SESSION_CLEARS);
    collector.register_counter(&SESSION_INTERRUPTS);
    collector.register_counter(&SESSION_ROLLBACKS);
    collector.register_counter(&SESSION_ERRORS);
    collector.register_moments(&SESSION_TURN_DURATION);
    collector.register_moments(&SESSION_TURN_COST);
}
