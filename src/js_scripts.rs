// src/js_scripts.rs

pub const PAGE_TITLE: &str = r#"
() => document.title
"#;

/// Duration in seconds, 0 while metadata is still loading, -1 if there is
/// no <video> element at all.
pub const VIDEO_DURATION: &str = r#"
() => {
    const v = document.querySelector("video");
    if (!v) return -1;
    return (isFinite(v.duration) && v.duration > 0) ? v.duration : 0;
}
"#;

/// Re-pauses and re-pins the position whenever the site restarts playback.
pub const INSTALL_PAUSE_GUARD: &str = r##"
(function() {
    const v = document.querySelector("video");
    if (!v || window._pauseGuard) return;
    const onPlay = () => {
        try {
            v.pause();
            if (isFinite(v.duration) && v.duration > 0) {
                v.currentTime = v.duration;
            }
        } catch (_) {}
    };
    v.addEventListener("play", onPlay, true);
    window._pauseGuard = onPlay;
})();
"##;

pub const SEEK_TO_END: &str = r#"
() => {
    const v = document.querySelector("video");
    if (!v) return false;
    try {
        v.currentTime = v.duration;
    } catch (_) {
        // Some players reject the exact end while buffering.
        try { v.currentTime = Math.max(0, v.duration - 0.01); } catch (_) {}
    }
    return true;
}
"#;

/// Pauses and reports whether the player actually ended up paused.
pub const PAUSE_VIDEO: &str = r#"
() => {
    const v = document.querySelector("video");
    if (!v) return false;
    try { v.pause(); } catch (_) {}
    return v.paused === true;
}
"#;

/// Scrolls the chat slot's nearest scrollable ancestor to the bottom.
pub const SCROLL_CHAT_TO_BOTTOM: &str = r##"
() => {
    const slot = document.querySelector("#wev-previous-chat-list-slot");
    if (!slot) return false;
    let scroller = slot;
    let cur = slot;
    while (cur && cur !== document.body) {
        const cs = getComputedStyle(cur);
        if ((cs.overflowY === "auto" || cs.overflowY === "scroll") &&
            cur.scrollHeight > cur.clientHeight) {
            scroller = cur;
            break;
        }
        cur = cur.parentElement;
    }
    scroller.scrollTop = scroller.scrollHeight;
    return true;
}
"##;

pub const EXTRACT_CHAT_ROWS: &str = r##"
() => {
    const slot = document.querySelector("#wev-previous-chat-list-slot");
    if (!slot) return [];
    const out = [];
    slot.querySelectorAll(".live-chat-list-item-slot-_-container").forEach(r => {
        const name = r.querySelector(".live-chat-list-item-profile-_-profile_name")
            ?.innerText?.trim() ?? "";
        const message = r.querySelector(".live-chat-list-item-message-_-message_body")
            ?.innerText?.trim() ?? "";
        out.push({ name, message });
    });
    return out;
}
"##;

/// Clicks every checked autoplay switch off once. Returns how many switches
/// were found and how many had to be flipped.
pub const AUTOPLAY_FORCE_OFF: &str = r##"
() => {
    const norm = (s) => (s || "").trim().toLowerCase();

    function findAutoplayThumbs() {
        return Array.from(document.querySelectorAll(".toggle-switch-_-thumb"))
            .filter(t => norm(t.querySelector(".blind")?.textContent).includes("auto play"));
    }

    function getState(thumb) {
        const ds = thumb?.getAttribute("data-state");
        if (ds === "checked" || ds === "unchecked") return ds;
        const host = thumb?.closest('[role="switch"], button, [role="button"]');
        const aria = host?.getAttribute?.("aria-checked");
        if (aria === "true") return "checked";
        if (aria === "false") return "unchecked";
        return null;
    }

    function getClickableHost(thumb) {
        // The real click target is the switch wrapper, not the thumb span.
        return thumb.closest('[role="switch"], button, [role="button"], label') || thumb;
    }

    window._autoplayOff = {
        find: findAutoplayThumbs,
        state: getState,
        host: getClickableHost,
    };

    const thumbs = findAutoplayThumbs();
    let changed = 0;
    for (const thumb of thumbs) {
        if (getState(thumb) === "checked") {
            getClickableHost(thumb).click();
            changed++;
        }
    }
    return { found: thumbs.length, changed };
}
"##;

/// Keeps autoplay off: whenever the page flips the switch back to checked,
/// click it off again. AUTOPLAY_FORCE_OFF must have run first.
pub const AUTOPLAY_OBSERVER: &str = r##"
(function() {
    if (!window._autoplayOff || window._autoplayObserver) return false;

    const observer = new MutationObserver(() => {
        for (const thumb of window._autoplayOff.find()) {
            if (window._autoplayOff.state(thumb) === "checked") {
                window._autoplayOff.host(thumb).click();
            }
        }
    });

    observer.observe(document.documentElement, {
        subtree: true,
        childList: true,
        attributes: true,
        attributeFilter: ["data-state", "aria-checked", "class"]
    });
    window._autoplayObserver = observer;
    return true;
})();
"##;
