mod job_tests;
