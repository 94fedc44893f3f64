//! Integration tests for the selector-driven driver with the built-in NexusPHP definition.

mod support;

use ptharvest_core::{DiscountLevel, RequestContext, SearchQuery, SiteError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::socket_guard::start_mock_server_or_skip;
use support::{nexusphp_site, resources};

const TORRENT_BYTES: &[u8] = b"d8:announce3:url4:infod4:name1:xee";

const TORRENTS_PAGE: &str = r#"<html><body>
<table class="torrents">
  <tr><td class="colhead">Type</td><td class="colhead">Name</td><td class="colhead">C</td>
      <td class="colhead">Added</td><td class="colhead">Size</td><td class="colhead">S</td>
      <td class="colhead">L</td><td class="colhead">Done</td></tr>
  <tr>
    <td class="rowfollow"><a href="?cat=401"><img alt="Movies" src="pic/cat_movie.png"></a></td>
    <td class="rowfollow"><table class="torrentname"><tr>
      <td class="embedded"><a title="Big.Buck.Bunny.2008.2160p"
          href="details.php?id=1001&amp;hit=1"><b>Big.Buck.Bunny...</b></a>
        <img class="pro_free" src="pic/trans.gif"
          alt="Free"><br><span>Open movie project</span></td>
      <td class="embedded"><a href="download.php?id=1001"><img alt="download"
          src="pic/dl.gif"></a></td>
    </tr></table></td>
    <td class="rowfollow">3</td>
    <td class="rowfollow"><span title="2024-01-02 03:04:05">1 day ago</span></td>
    <td class="rowfollow">1.5<br>GB</td>
    <td class="rowfollow">1,204</td>
    <td class="rowfollow">7</td>
    <td class="rowfollow">3,310</td>
  </tr>
  <tr>
    <td class="rowfollow"><a href="?cat=402"><img alt="TV" src="pic/cat_tv.png"></a></td>
    <td class="rowfollow"><table class="torrentname"><tr>
      <td class="embedded"><a title="Elephants.Dream.1080p"
          href="details.php?id=1002&amp;hit=1"><b>Elephants.Dream</b></a></td>
    </tr></table></td>
    <td class="rowfollow">0</td>
    <td class="rowfollow"><span title="2023-12-31 23:00:00">2 days ago</span></td>
    <td class="rowfollow">700 MB</td>
    <td class="rowfollow">12</td>
    <td class="rowfollow">0</td>
    <td class="rowfollow">45</td>
  </tr>
</table>
</body></html>"#;

const INDEX_PAGE: &str = r#"<html><body>
<div id="info_block">Welcome back, <a href="userdetails.php?id=4242"><b>alice</b></a>
  [<a href="logout.php">logout</a>] Bonus: 1,234.5
  <a href="messages.php"><img alt="inbox" src="pic/inbox.gif"><b>3</b></a></div>
</body></html>"#;

fn details_page(receiver: u32) -> String {
    format!(
        r#"<html><body>
<div id="info_block">Welcome back, <a
  href="userdetails.php?id=4242"><b>alice</b></a> Bonus: 1,300.0</div>
<table>
  <tr><td>Username</td><td>alice <a href="sendmessage.php?receiver={receiver}">PM</a></td></tr>
  <tr><td>Join date</td><td>2020-01-01 00:00:00</td></tr>
  <tr><td>Last action</td><td>2024-01-02 03:04:05</td></tr>
  <tr><td>Uploaded</td><td>2.5 TB</td></tr>
  <tr><td>Downloaded</td><td>1.25 TB</td></tr>
  <tr><td>Ratio</td><td>2.000</td></tr>
  <tr><td>Class</td><td><img src="pic/class/power.gif" title="Power User"
    alt="Power User"></td></tr>
</table>
</body></html>"#
    )
}

const BONUS_PAGE: &str =
    r"<html><body><p>You are currently getting 12.5 bonus points per hour.</p></body></html>";

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("cookie", "uid=1; pass=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_search_parses_rows_with_builtin_definition() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/torrents.php"))
        .and(query_param("search", "bunny"))
        .and(query_param("incldead", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TORRENTS_PAGE))
        .mount(&server)
        .await;

    let resources = resources();
    let site = nexusphp_site("demo", &server.uri(), &resources);
    let items = site
        .search(&RequestContext::new(), &SearchQuery::new("bunny"))
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    let first = &items[0];
    assert_eq!(first.id, "1001");
    assert_eq!(first.title, "Big.Buck.Bunny.2008.2160p");
    assert_eq!(first.category, "Movies");
    assert_eq!(first.discount_level, DiscountLevel::Free);
    assert_eq!(first.size_bytes, 1_610_612_736);
    assert_eq!(first.seeders, 1204);
    assert_eq!(first.leechers, 7);
    assert_eq!(first.snatched, 3310);
    assert!(first.uploaded_at > 0);
    assert_eq!(
        first.download_url.as_deref(),
        Some(format!("{}/download.php?id=1001", server.uri()).as_str())
    );

    let second = &items[1];
    assert_eq!(second.id, "1002");
    assert_eq!(second.discount_level, DiscountLevel::None);
    assert_eq!(second.size_bytes, 734_003_200);
    assert_eq!(
        second.download_url.as_deref(),
        Some(format!("{}/download.php?id=1002", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_user_info_runs_every_step() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_html(&server, "/index.php", INDEX_PAGE.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/userdetails.php"))
        .and(query_param("id", "4242"))
        .respond_with(ResponseTemplate::new(200).set_body_string(details_page(4242)))
        .mount(&server)
        .await;
    mount_html(&server, "/mybonus.php", BONUS_PAGE.to_string()).await;

    let resources = resources();
    let site = nexusphp_site("demo", &server.uri(), &resources);
    let info = site.get_user_info(&RequestContext::new()).await.unwrap();

    assert_eq!(info.user_id, "4242");
    assert_eq!(info.username, "alice");
    assert_eq!(info.unread_messages, 3);
    assert_eq!(info.uploaded, 2_748_779_069_440);
    assert_eq!(info.downloaded, 1_374_389_534_720);
    assert!((info.ratio - 2.0).abs() < 1e-9);
    assert_eq!(info.rank, "Power User");
    assert!(info.join_date > 0);
    // bonus is pick-last: the details page value replaces the index page value
    assert!((info.bonus - 1300.0).abs() < 1e-9);
    assert!((info.bonus_per_hour - 12.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_user_info_assertion_mismatch_keeps_first_step() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_html(&server, "/index.php", INDEX_PAGE.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/userdetails.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(details_page(9999)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mybonus.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BONUS_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    let resources = resources();
    let site = nexusphp_site("demo", &server.uri(), &resources);
    let info = site.get_user_info(&RequestContext::new()).await.unwrap();

    assert_eq!(info.user_id, "4242");
    assert_eq!(info.username, "alice");
    assert!((info.bonus - 1234.5).abs() < 1e-9);
    assert_eq!(info.uploaded, 0);
    assert!(info.bonus_per_hour.abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_login_redirect_is_invalid_credentials() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/login.php?returnto=index.php"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login.php"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<form action=\"takelogin.php\"></form>"),
        )
        .mount(&server)
        .await;

    let resources = resources();
    let site = nexusphp_site("demo", &server.uri(), &resources);
    let err = site.get_user_info(&RequestContext::new()).await.unwrap_err();
    assert!(matches!(err, SiteError::InvalidCredentials { .. }));
}

#[tokio::test]
async fn test_download_returns_torrent_bytes() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/download.php"))
        .and(query_param("id", "1001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(TORRENT_BYTES.to_vec()))
        .mount(&server)
        .await;

    let resources = resources();
    let site = nexusphp_site("demo", &server.uri(), &resources);
    let bytes = site.download(&RequestContext::new(), "1001").await.unwrap();
    assert!(bytes.starts_with(b"d8:announce"));
}
