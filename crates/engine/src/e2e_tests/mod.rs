//! End-to-end turn flows over scripted models and the in-memory store.

mod turn_flow_tests;
