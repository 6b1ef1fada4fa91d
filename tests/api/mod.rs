mod friend_tests;
mod health_tests;
mod private_chat_tests;
mod room_tests;
mod user_tests;
