pub mod padding_test;
