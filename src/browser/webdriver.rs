//! WebDriver-backed `Page`.
//!
//! thirtyfour is async; the harness is not. Each page owns a
//! current-thread tokio runtime and blocks on every command.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use thirtyfour::WindowHandle;
use tokio::runtime::Runtime;

use super::{frame_selector, BrowserFactory, ElementState, FrameHandle, Page};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Creates one chromedriver session per scenario.
pub struct WebDriverFactory {
    pub url: String,
    pub headless: bool,
}

impl WebDriverFactory {
    pub fn new(url: impl Into<String>, headless: bool) -> Self {
        Self {
            url: url.into(),
            headless,
        }
    }
}

impl BrowserFactory for WebDriverFactory {
    fn open(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(WebDriverPage::connect(&self.url, self.headless)?))
    }
}

pub struct WebDriverPage {
    runtime: Runtime,
    driver: Option<WebDriver>,
}

impl WebDriverPage {
    pub fn connect(url: &str, headless: bool) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build tokio runtime")?;

        let mut caps = DesiredCapabilities::chrome();
        if headless {
            caps.add_chrome_arg("--headless=new")?;
        }
        caps.add_chrome_arg("--window-size=1920,1080")?;
        caps.add_chrome_arg("--disable-gpu")?;

        let driver = runtime
            .block_on(WebDriver::new(url, caps))
            .with_context(|| format!("Failed to start WebDriver session at {}", url))?;
        tracing::info!("WebDriver session started at {}", url);

        Ok(Self {
            runtime,
            driver: Some(driver),
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| anyhow!("WebDriver session already closed"))
    }

    async fn find_first(driver: &WebDriver, selector: &str) -> Result<WebElement> {
        let element = driver.query(By::Css(selector)).first().await?;
        Ok(element)
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = self.runtime.block_on(driver.quit()) {
                tracing::warn!("Failed to close WebDriver session: {}", e);
            }
        }
    }
}

impl Page for WebDriverPage {
    fn goto(&self, url: &str) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(driver.goto(url))?;
        Ok(())
    }

    fn reload(&self) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(driver.refresh())?;
        Ok(())
    }

    fn wait_for_selector(&self, selector: &str, state: ElementState, timeout: Duration) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            match state {
                ElementState::Visible => {
                    driver
                        .query(By::Css(selector))
                        .wait(timeout, POLL_INTERVAL)
                        .and_displayed()
                        .first()
                        .await?;
                }
                ElementState::Attached => {
                    driver
                        .query(By::Css(selector))
                        .wait(timeout, POLL_INTERVAL)
                        .first()
                        .await?;
                }
                ElementState::Hidden => {
                    let deadline = Instant::now() + timeout;
                    loop {
                        let mut any_visible = false;
                        for element in driver.find_all(By::Css(selector)).await? {
                            if element.is_displayed().await.unwrap_or(false) {
                                any_visible = true;
                                break;
                            }
                        }
                        if !any_visible {
                            break;
                        }
                        if Instant::now() >= deadline {
                            return Err(anyhow!("'{}' still visible after {:?}", selector, timeout));
                        }
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                }
            }
            Ok(())
        })
    }

    fn click(&self, selector: &str) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            let element = Self::find_first(driver, selector).await?;
            element.scroll_into_view().await?;
            element.click().await?;
            Ok(())
        })
    }

    fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            let element = Self::find_first(driver, selector).await?;
            element.clear().await?;
            element.send_keys(value).await?;
            Ok(())
        })
    }

    fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            let element = Self::find_first(driver, selector).await?;
            let select = SelectElement::new(&element).await?;
            select.select_by_value(value).await?;
            Ok(())
        })
    }

    fn text_content(&self, selector: &str) -> Result<Option<String>> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            match driver.find_all(By::Css(selector)).await?.into_iter().next() {
                Some(element) => Ok(Some(element.text().await?)),
                None => Ok(None),
            }
        })
    }

    fn screenshot_element(&self, selector: &str, timeout: Duration) -> Result<Vec<u8>> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            let element = driver
                .query(By::Css(selector))
                .wait(timeout, POLL_INTERVAL)
                .first()
                .await?;
            Ok(element.screenshot_as_png().await?)
        })
    }

    fn screenshot_page(&self) -> Result<Vec<u8>> {
        let driver = self.driver()?;
        Ok(self.runtime.block_on(driver.screenshot_as_png())?)
    }

    fn find_frame(&self, name: &str) -> Result<Option<FrameHandle>> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            driver.enter_default_frame().await?;
            let found = driver.find_all(By::Css(&frame_selector(name))).await?;
            Ok((!found.is_empty()).then(|| FrameHandle::new(name)))
        })
    }

    fn frame_body_ready(&self, frame: &FrameHandle, timeout: Duration) -> Result<bool> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            driver.enter_default_frame().await?;
            let element = Self::find_first(driver, &frame.selector()).await?;
            element.enter_frame().await?;
            let ready = driver
                .query(By::Tag("body"))
                .wait(timeout, POLL_INTERVAL)
                .first()
                .await
                .is_ok();
            driver.enter_default_frame().await?;
            Ok(ready)
        })
    }

    fn enter_frame(&self, frame: &FrameHandle) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(async {
            driver.enter_default_frame().await?;
            let element = Self::find_first(driver, &frame.selector()).await?;
            element.enter_frame().await?;
            Ok(())
        })
    }

    fn leave_frame(&self) -> Result<()> {
        let driver = self.driver()?;
        self.runtime.block_on(driver.enter_default_frame())?;
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let driver = self.driver()?;
        let ret = self.runtime.block_on(driver.execute(script, Vec::new()))?;
        Ok(ret.json().clone())
    }

    fn window_handles(&self) -> Result<Vec<String>> {
        let driver = self.driver()?;
        let windows = self.runtime.block_on(driver.windows())?;
        Ok(windows.into_iter().map(String::from).collect())
    }

    fn current_window(&self) -> Result<String> {
        let driver = self.driver()?;
        Ok(self.runtime.block_on(driver.window()).map(String::from)?)
    }

    fn switch_to_window(&self, handle: &str) -> Result<()> {
        let driver = self.driver()?;
        self.runtime
            .block_on(driver.switch_to_window(WindowHandle::try_from(handle)?))?;
        Ok(())
    }
}
