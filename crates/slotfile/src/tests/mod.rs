mod format_tests;
mod reader_tests;
