mod integration_test;
