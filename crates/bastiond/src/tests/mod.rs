mod process_behaviour;
mod support;
