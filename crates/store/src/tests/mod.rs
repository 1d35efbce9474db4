mod disk_tests;
mod helpers;
