mod broadcaster_tests;
mod gateway_tests;
mod socket_tests;
