//! HTML for the player page.

/// Full-window video.js player pointed at `video_src`.
pub fn player_page(video_src: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <link href="https://vjs.zencdn.net/7.20.3/video-js.css" rel="stylesheet">
    <script src="https://vjs.zencdn.net/7.20.3/video.min.js"></script>
    <style>
        body {{ margin: 0; }}
        video {{ width: 100vw; height: 100vh; }}
        .video-js .vjs-big-play-button {{
            left: 50% !important;
            top: 50% !important;
            transform: translate(-50%, -50%) !important;
        }}
    </style>
</head>
<body>
    <video
        id="player"
        class="video-js vjs-default-skin"
        controls
        preload="metadata"
        style="margin: 0; width: 100vw; height: 100vh;"
        data-setup='{{}}'
    >
        <source src="{video_src}" type="video/mp4">
    </video>
</body>
</html>
"#,
        video_src = video_src,
    )
}
