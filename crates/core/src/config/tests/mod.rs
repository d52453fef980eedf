mod app_config_tests;
