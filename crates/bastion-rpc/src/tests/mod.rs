//! End-to-end suites running a server and a client over loopback TCP.

mod support;
