pub mod test_helpers;

mod recording_session_tests;
