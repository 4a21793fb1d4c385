//! Behavioural suites for the object and service framework.

mod service_behaviour;
mod support;
