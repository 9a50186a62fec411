mod test_ws_channel_reconnect;
